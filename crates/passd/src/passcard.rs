//! Layout of a decrypted entry: the first line is the password, the rest is
//! metadata made of leading `key: value` fields followed by free-form notes.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

const PASSWORD_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_-";
const GENERATED_PASSWORD_LEN: usize = 16;

static FIELD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\s:]+):\s*(.*)$").expect("field pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: String,
    pub value: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Passcard {
    password: String,
    metadata: String,
    fields: Vec<Field>,
    notes: String,
}

impl Passcard {
    pub fn parse(plaintext: &str) -> Self {
        let (first, rest) = match plaintext.split_once('\n') {
            Some((first, rest)) => (first, Some(rest)),
            None => (plaintext, None),
        };
        let metadata = rest.map(str::trim).unwrap_or_default().to_string();
        let (fields, notes) = split_fields(&metadata);

        Self {
            password: first.trim().to_string(),
            metadata,
            fields,
            notes,
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn field(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| {
            self.fields
                .iter()
                .find(|field| field.key.eq_ignore_ascii_case(key))
                .map(|field| field.value.as_str())
        })
    }
}

impl std::fmt::Debug for Passcard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passcard")
            .field("password", &mask_password(&self.password))
            .field("fields", &self.fields.len())
            .finish_non_exhaustive()
    }
}

fn split_fields(metadata: &str) -> (Vec<Field>, String) {
    let mut fields = Vec::new();
    let mut notes = Vec::new();
    let mut in_fields = true;

    for line in metadata.lines() {
        if !in_fields {
            notes.push(line);
            continue;
        }

        if let Some(caps) = FIELD_LINE.captures(line) {
            fields.push(Field {
                key: caps[1].to_string(),
                value: caps[2].to_string(),
            });
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        in_fields = false;
        notes.push(line);
    }

    (fields, notes.join("\n").trim().to_string())
}

pub fn mask_password(password: &str) -> &'static str {
    if password.is_empty() {
        "<empty>"
    } else {
        "***<has value>***"
    }
}

pub fn generate_password() -> String {
    let mut rng = rand::rng();
    (0..GENERATED_PASSWORD_LEN)
        .map(|_| PASSWORD_CHARSET[rng.random_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}
