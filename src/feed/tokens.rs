//! Pull-based markup token stream.
//!
//! The harvester and the search result parser only need to see tags one at a
//! time in document order, so they consume a [`TokenSource`] instead of
//! building a DOM. [`HtmlTokenizer`] is the default source: `quick-xml` driven
//! in lenient mode, which copes with the unbalanced end tags and valueless
//! attributes found in real HTML.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;

/// Elements whose content is raw text in HTML and must not produce tags.
const RAW_TEXT_ELEMENTS: [&[u8]; 2] = [b"script", b"style"];

/// A single attribute of a start tag. Keys are lowercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub key: String,
    pub value: String,
}

/// One unit of markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Opening or self-closing tag, attributes in source order
    StartTag { name: String, attrs: Vec<Attr> },
    EndTag { name: String },
    Text,
    EndOfStream,
    /// The markup could not be tokenized further
    Error(String),
}

/// Forward-only source of [`Token`]s. Once `EndOfStream` or `Error` has been
/// returned the source is exhausted.
pub trait TokenSource {
    fn next_token(&mut self) -> Token;
}

/// [`TokenSource`] over an in-memory HTML document.
pub struct HtmlTokenizer<'a> {
    input: &'a [u8],
    /// Offset of the reader's slice within `input`
    offset: usize,
    reader: Reader<&'a [u8]>,
    /// Name of the raw-text element we are currently inside, if any
    raw_text: Option<&'static [u8]>,
    done: bool,
}

fn lenient_reader(html: &[u8]) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(html);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.trim_text(true);
    reader
}

impl<'a> HtmlTokenizer<'a> {
    pub fn new(html: &'a [u8]) -> Self {
        Self {
            input: html,
            offset: 0,
            reader: lenient_reader(html),
            raw_text: None,
            done: false,
        }
    }

    fn start_tag(&self, e: &BytesStart<'_>) -> Token {
        let decoder = self.reader.decoder();
        let mut attrs = Vec::new();

        for attr_result in e.html_attributes() {
            let attr = match attr_result {
                Ok(attr) => attr,
                Err(err) => {
                    tracing::trace!(error = %err, "Skipping malformed attribute");
                    continue;
                }
            };
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            // Unknown HTML entities (&nbsp; etc.) fail to unescape; keep the raw text then
            let value = match attr.decode_and_unescape_value(decoder) {
                Ok(v) => v.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            attrs.push(Attr { key, value });
        }

        Token::StartTag {
            name: lowercase_name(e.name().as_ref()).into_owned(),
            attrs,
        }
    }

    /// Skips everything up to the end tag of the current raw-text element.
    ///
    /// The body is scanned as plain bytes, so `i<n` inside a script never
    /// opens a tag. The reader is then restarted just past the end tag.
    fn skip_raw_text(&mut self, element: &'static [u8]) -> Token {
        let input = self.input;
        let start = self.offset + self.reader.buffer_position() as usize;
        let rest = input.get(start..).unwrap_or_default();

        let Some(close) = find_end_tag(rest, element) else {
            return self.finish(Token::EndOfStream);
        };
        let after_name = start + close + 2 + element.len();
        let resume = match input[after_name..].iter().position(|&b| b == b'>') {
            Some(gt) => after_name + gt + 1,
            None => input.len(),
        };

        self.offset = resume;
        self.reader = lenient_reader(&input[resume..]);
        Token::EndTag {
            name: lowercase_name(element).into_owned(),
        }
    }

    fn finish(&mut self, token: Token) -> Token {
        self.done = true;
        token
    }
}

impl TokenSource for HtmlTokenizer<'_> {
    fn next_token(&mut self) -> Token {
        if self.done {
            return Token::EndOfStream;
        }

        if let Some(element) = self.raw_text.take() {
            return self.skip_raw_text(element);
        }

        loop {
            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let name = e.name();
                    self.raw_text = RAW_TEXT_ELEMENTS
                        .iter()
                        .copied()
                        .find(|raw| name.as_ref().eq_ignore_ascii_case(raw));
                    return self.start_tag(&e);
                }
                Ok(Event::Empty(e)) => return self.start_tag(&e),
                Ok(Event::End(e)) => {
                    return Token::EndTag {
                        name: lowercase_name(e.name().as_ref()).into_owned(),
                    }
                }
                Ok(Event::Text(_)) | Ok(Event::CData(_)) => return Token::Text,
                Ok(Event::Eof) => return self.finish(Token::EndOfStream),
                Err(e) => return self.finish(Token::Error(e.to_string())),
                // Comments, doctype, declarations and processing instructions
                Ok(_) => {}
            }
        }
    }
}

/// Finds `</element` (any case) not followed by another name character.
fn find_end_tag(haystack: &[u8], element: &[u8]) -> Option<usize> {
    let tag_len = 2 + element.len();
    haystack.windows(tag_len).enumerate().find_map(|(i, window)| {
        let matches = window.starts_with(b"</") && window[2..].eq_ignore_ascii_case(element);
        let terminated = haystack
            .get(i + tag_len)
            .map_or(true, |&b| !b.is_ascii_alphanumeric());
        (matches && terminated).then_some(i)
    })
}

fn lowercase_name(name: &[u8]) -> Cow<'_, str> {
    match String::from_utf8_lossy(name) {
        Cow::Borrowed(s) if !s.bytes().any(|b| b.is_ascii_uppercase()) => Cow::Borrowed(s),
        s => Cow::Owned(s.to_ascii_lowercase()),
    }
}
