/// Options parsed from the `q` command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteArgs {
    /// Signed distance from the base message.
    pub offset: i64,
    pub background_color: String,
    pub include_replies: bool,
}

const REPLY_KEYWORDS: [&str; 3] = ["r", "reply", "回复"];

/// Interpret free-form tokens; unknown tokens are ignored.
#[must_use]
pub fn parse_args<'a>(tokens: impl IntoIterator<Item = &'a str>, default_color: &str) -> QuoteArgs {
    let mut args = QuoteArgs {
        offset: 0,
        background_color: default_color.to_owned(),
        include_replies: false,
    };

    for token in tokens {
        let stripped = token.trim_start_matches('-');
        if !stripped.is_empty() && stripped.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = stripped.parse::<i64>() {
                args.offset = if stripped.len() < token.len() { -n } else { n };
            }
        } else if REPLY_KEYWORDS
            .iter()
            .any(|k| token.to_lowercase() == *k)
        {
            args.include_replies = true;
        } else if token.starts_with('#') || is_alphabetic(token) {
            args.background_color = token.to_owned();
        }
    }

    args
}

fn is_alphabetic(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_alphabetic)
}
