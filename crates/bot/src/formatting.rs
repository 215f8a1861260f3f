//! `formatted_body` HTML to plain text with formatting entities.
//!
//! Entity offsets and lengths count UTF-16 code units.

use plugin_core::Entity;

struct Open {
    tag: String,
    kind: Option<&'static str>,
    start: usize,
}

#[derive(Default)]
struct Builder {
    text: String,
    units: usize,
    open: Vec<Open>,
    entities: Vec<Entity>,
    /// Depth inside `<mx-reply>`, whose content is a reply fallback.
    hidden: usize,
}

const fn is_block(tag: &str) -> bool {
    matches!(
        tag.as_bytes(),
        b"p" | b"div" | b"blockquote" | b"pre" | b"li" | b"ul" | b"ol" | b"h1" | b"h2" | b"h3"
            | b"h4" | b"h5" | b"h6"
    )
}

const fn is_void(tag: &str) -> bool {
    matches!(tag.as_bytes(), b"br" | b"hr" | b"img")
}

fn entity_kind(tag: &str, attrs: &str, in_pre: bool) -> Option<&'static str> {
    match tag {
        "b" | "strong" => Some("bold"),
        "i" | "em" => Some("italic"),
        "u" | "ins" => Some("underline"),
        "s" | "del" | "strike" => Some("strikethrough"),
        "code" if !in_pre => Some("code"),
        "pre" => Some("pre"),
        "blockquote" => Some("blockquote"),
        "span" | "font" if attrs.contains("data-mx-spoiler") => Some("spoiler"),
        _ => None,
    }
}

impl Builder {
    fn push(&mut self, s: &str) {
        if self.hidden > 0 || s.is_empty() {
            return;
        }
        self.units += s.encode_utf16().count();
        self.text.push_str(s);
    }

    fn newline(&mut self) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.push("\n");
        }
    }

    fn in_pre(&self) -> bool {
        self.open.iter().any(|o| o.tag == "pre")
    }

    fn text(&mut self, raw: &str) {
        // Source newlines between block tags are layout, not content.
        if !self.in_pre() && raw.trim().is_empty() && raw.contains('\n') {
            return;
        }
        self.push(&decode(raw));
    }

    fn open(&mut self, tag: &str, attrs: &str) {
        if tag == "mx-reply" {
            self.hidden += 1;
            return;
        }
        if tag == "br" {
            self.push("\n");
            return;
        }
        if is_block(tag) {
            self.newline();
        }
        if is_void(tag) {
            return;
        }
        let kind = entity_kind(tag, attrs, self.in_pre());
        self.open.push(Open {
            tag: tag.to_owned(),
            kind,
            start: self.units,
        });
    }

    fn close(&mut self, tag: &str) {
        if tag == "mx-reply" {
            self.hidden = self.hidden.saturating_sub(1);
            return;
        }
        let Some(pos) = self.open.iter().rposition(|o| o.tag == tag) else {
            return;
        };
        let closed: Vec<Open> = self.open.drain(pos..).collect();
        for open in closed.into_iter().rev() {
            self.end(&open);
        }
        if is_block(tag) {
            self.newline();
        }
    }

    fn end(&mut self, open: &Open) {
        if let Some(kind) = open.kind
            && self.units > open.start
        {
            self.entities.push(Entity {
                kind: kind.to_owned(),
                offset: open.start,
                length: self.units - open.start,
                custom_emoji_id: None,
            });
        }
    }

    fn finish(mut self) -> (String, Vec<Entity>) {
        let unclosed: Vec<Open> = self.open.drain(..).collect();
        for open in unclosed.into_iter().rev() {
            self.end(&open);
        }
        let kept = self.text.trim_end_matches('\n').len();
        let total = self.units - (self.text.len() - kept);
        self.text.truncate(kept);

        let mut entities: Vec<Entity> = self
            .entities
            .into_iter()
            .filter(|e| e.offset < total)
            .map(|mut e| {
                e.length = e.length.min(total - e.offset);
                e
            })
            .collect();
        entities.sort_by_key(|e| e.offset);
        (self.text, entities)
    }
}

/// Plain text and entities for an HTML `formatted_body`.
pub fn html_to_entities(html: &str) -> (String, Vec<Entity>) {
    let mut builder = Builder::default();
    let mut rest = html;
    while let Some(lt) = rest.find('<') {
        builder.text(&rest[..lt]);
        let Some(gt) = rest[lt..].find('>') else {
            builder.text(&rest[lt..]);
            rest = "";
            break;
        };
        let inner = rest[lt + 1..lt + gt].trim();
        rest = &rest[lt + gt + 1..];

        if inner.starts_with('!') {
            continue;
        }
        if let Some(name) = inner.strip_prefix('/') {
            builder.close(&name.trim().to_ascii_lowercase());
            continue;
        }
        let self_closing = inner.ends_with('/');
        let inner = inner.trim_end_matches('/');
        let (name, attrs) = inner
            .split_once(char::is_whitespace)
            .unwrap_or((inner, ""));
        let name = name.to_ascii_lowercase();
        builder.open(&name, attrs);
        if self_closing && !is_void(&name) {
            builder.close(&name);
        }
    }
    builder.text(rest);
    builder.finish()
}

fn decode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let named = after
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| entity_char(&after[..end]).map(|c| (end, c)));
        if let Some((end, c)) = named {
            out.push(c);
            rest = &after[end + 1..];
        } else {
            out.push('&');
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

fn entity_char(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
