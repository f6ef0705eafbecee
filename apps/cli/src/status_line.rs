const TICK_PREFIX: &str = "Will clear ";

#[derive(Debug, Default)]
pub(crate) struct StatusPrinter {
    last_tick: Option<String>,
}

impl StatusPrinter {
    pub(crate) fn render(&mut self, message: &str) -> Option<String> {
        if message.starts_with(TICK_PREFIX) {
            if self.last_tick.as_deref() == Some(message) {
                return None;
            }
            self.last_tick = Some(message.to_string());
            return Some(format!("\r-- {message}\x1b[K"));
        }

        let lead = if self.last_tick.take().is_some() {
            "\n"
        } else {
            ""
        };
        Some(format!("{lead}-- {message}\n"))
    }
}
