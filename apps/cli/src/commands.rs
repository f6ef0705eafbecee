#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Search(String),
    /// 1-based index into the last printed result list.
    Show(usize),
    Raw(usize),
    Copy(usize),
    Field { index: usize, key: String },
    Login(usize),
    Email(usize),
    Open(usize),
    Edit(usize),
    New(String),
    Generate,
    Reindex,
    Help,
    Quit,
    Invalid(String),
}

pub(crate) struct CommandMenuItem {
    pub(crate) command: &'static str,
    pub(crate) description: &'static str,
}

pub(crate) const COMMAND_MENU: [CommandMenuItem; 13] = [
    CommandMenuItem {
        command: "/show N",
        description: "Show fields and notes of result N",
    },
    CommandMenuItem {
        command: "/raw N",
        description: "Print the ciphertext of result N as base64",
    },
    CommandMenuItem {
        command: "/copy N",
        description: "Copy the password of result N",
    },
    CommandMenuItem {
        command: "/field N KEY",
        description: "Copy a metadata field of result N",
    },
    CommandMenuItem {
        command: "/login N",
        description: "Copy the login of result N",
    },
    CommandMenuItem {
        command: "/email N",
        description: "Copy the email of result N",
    },
    CommandMenuItem {
        command: "/open N",
        description: "Open the URL of result N",
    },
    CommandMenuItem {
        command: "/edit N",
        description: "Replace the content of result N (end with '.', abort with /cancel)",
    },
    CommandMenuItem {
        command: "/new NAME",
        description: "Create an entry with a generated password",
    },
    CommandMenuItem {
        command: "/gen",
        description: "Copy a freshly generated password",
    },
    CommandMenuItem {
        command: "/reindex",
        description: "Rebuild the entry index now",
    },
    CommandMenuItem {
        command: "/help",
        description: "List commands",
    },
    CommandMenuItem {
        command: "/quit",
        description: "Exit",
    },
];

pub(crate) fn parse_command(input: &str) -> Command {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return Command::Search(trimmed.to_string());
    }

    let mut parts = trimmed.split_whitespace();
    let head = parts.next().unwrap_or("").to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    match (head.as_str(), args.as_slice()) {
        ("/show", [n]) => parse_index(n).map_or_else(|| invalid(trimmed), Command::Show),
        ("/raw", [n]) => parse_index(n).map_or_else(|| invalid(trimmed), Command::Raw),
        ("/copy", [n]) => parse_index(n).map_or_else(|| invalid(trimmed), Command::Copy),
        ("/field", [n, key]) => match parse_index(n) {
            Some(index) => Command::Field {
                index,
                key: key.to_string(),
            },
            None => invalid(trimmed),
        },
        ("/login", [n]) => parse_index(n).map_or_else(|| invalid(trimmed), Command::Login),
        ("/email", [n]) => parse_index(n).map_or_else(|| invalid(trimmed), Command::Email),
        ("/open", [n]) => parse_index(n).map_or_else(|| invalid(trimmed), Command::Open),
        ("/edit", [n]) => parse_index(n).map_or_else(|| invalid(trimmed), Command::Edit),
        ("/new", [_, ..]) => Command::New(args.join(" ")),
        ("/gen", []) => Command::Generate,
        ("/reindex", []) => Command::Reindex,
        ("/help", []) | ("/", []) => Command::Help,
        ("/quit", []) | ("/exit", []) => Command::Quit,
        _ => invalid(trimmed),
    }
}

fn parse_index(token: &str) -> Option<usize> {
    token.parse::<usize>().ok().filter(|n| *n > 0)
}

fn invalid(input: &str) -> Command {
    Command::Invalid(input.to_string())
}
