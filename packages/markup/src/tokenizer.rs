use crate::error::{ParseError, ParseResult};
use logos::Logos;
use std::fmt;
use std::ops::Range;

/// Top-level markup tokens. A whole opening tag (name and attributes) is one
/// token; its attributes are split by [`AttrToken`].
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token<'src> {
    #[regex(r"<[a-zA-Z][a-zA-Z0-9]*[^<>]*>", |lex| lex.slice())]
    OpenTag(&'src str),

    #[regex(r"</[a-zA-Z][a-zA-Z0-9]*\s*>", |lex| lex.slice())]
    CloseTag(&'src str),

    #[regex(r"[^<]+", |lex| lex.slice())]
    Text(&'src str),
}

/// Tokens inside an opening tag
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"\s+")]
pub enum AttrToken<'src> {
    #[token("<")]
    Open,

    #[token(">")]
    Close,

    #[token("/>")]
    SelfClose,

    #[token("=")]
    Equals,

    #[regex(r"[a-zA-Z][a-zA-Z0-9_-]*", |lex| lex.slice())]
    Name(&'src str),

    #[regex(r#""[^"]*""#, |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    Value(&'src str),
}

impl<'src> fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::OpenTag(s) => write!(f, "tag {}", s),
            Token::CloseTag(s) => write!(f, "closing tag {}", s),
            Token::Text(s) => write!(f, "text {:?}", s),
        }
    }
}

/// Parsed opening tag
#[derive(Debug, Clone, PartialEq)]
pub struct TagHead<'src> {
    pub name: &'src str,
    /// (name, value); bare flags have no value
    pub attrs: Vec<(&'src str, Option<&'src str>)>,
    pub self_closing: bool,
}

impl<'src> TagHead<'src> {
    pub fn attr(&self, name: &str) -> Option<&'src str> {
        self.attrs
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, v)| *v)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.attrs.iter().any(|(n, _)| *n == name)
    }
}

/// Tokenize a markup string. Unlexable input (a stray `<`) is an error.
pub fn tokenize(source: &str) -> ParseResult<Vec<(Token<'_>, Range<usize>)>> {
    let mut tokens = Vec::new();
    for (result, span) in Token::lexer(source).spanned() {
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => return Err(ParseError::lexer_error(span.start)),
        }
    }
    Ok(tokens)
}

/// Split an opening tag slice into its name and attributes
pub fn parse_tag_head(slice: &str, pos: usize) -> ParseResult<TagHead<'_>> {
    let mut lexer = AttrToken::lexer(slice);
    let mut next = || match lexer.next() {
        Some(Ok(token)) => Ok(Some(token)),
        Some(Err(())) => Err(ParseError::invalid_attribute(pos, format!("cannot read tag {}", slice))),
        None => Ok(None),
    };

    if next()? != Some(AttrToken::Open) {
        return Err(ParseError::invalid_syntax(pos, "expected '<'"));
    }
    let name = match next()? {
        Some(AttrToken::Name(name)) => name,
        _ => return Err(ParseError::invalid_syntax(pos, "expected tag name")),
    };

    let mut attrs: Vec<(&str, Option<&str>)> = Vec::new();
    let mut self_closing = false;
    let mut pending_eq = false;

    loop {
        match next()? {
            Some(AttrToken::Name(attr)) if !pending_eq => attrs.push((attr, None)),
            Some(AttrToken::Equals) if !pending_eq && !attrs.is_empty() => pending_eq = true,
            Some(AttrToken::Value(value)) if pending_eq => {
                if let Some(last) = attrs.last_mut() {
                    last.1 = Some(value);
                }
                pending_eq = false;
            }
            Some(AttrToken::Close) if !pending_eq => break,
            Some(AttrToken::SelfClose) if !pending_eq => {
                self_closing = true;
                break;
            }
            other => {
                return Err(ParseError::invalid_attribute(
                    pos,
                    format!("unexpected {:?} in <{}>", other, name),
                ))
            }
        }
    }

    Ok(TagHead {
        name,
        attrs,
        self_closing,
    })
}

/// Tag name of a closing tag slice (`</p>` → `p`)
pub fn close_tag_name(slice: &str) -> &str {
    slice.trim_start_matches("</").trim_end_matches('>').trim()
}

/// Decode the entities the serializer emits
pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
