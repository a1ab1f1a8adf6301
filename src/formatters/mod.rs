//! Built-in formatters
//!
//! Each formatter is a [`Reporter`](crate::Reporter) writing to any
//! `io::Write`. They only ever see visible units, and they render the
//! missing-step stubs after the summary.

mod documentation;
mod html;
mod json;

use std::cell::RefCell;
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;
use std::str::FromStr;
use crate::reporter::Reporter;

pub use documentation::DocumentationFormatter;
pub use html::HtmlFormatter;
pub use json::JsonFormatter;

/// Output format selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Plain-text documentation tree
    Doc,
    /// One JSON document with a record per example
    Json,
    /// Standalone HTML page
    Html,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doc" | "d" | "documentation" => Ok(Format::Doc),
            "json" | "j" => Ok(Format::Json),
            "html" | "h" => Ok(Format::Html),
            other => Err(format!("unknown format {:?}; expected doc, json or html", other)),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Doc => f.write_str("doc"),
            Format::Json => f.write_str("json"),
            Format::Html => f.write_str("html"),
        }
    }
}

/// Build the formatter for `format` writing to `out`
pub fn formatter(format: Format, out: Box<dyn Write>) -> Box<dyn Reporter> {
    match format {
        Format::Doc => Box::new(DocumentationFormatter::new(out)),
        Format::Json => Box::new(JsonFormatter::new(out)),
        Format::Html => Box::new(HtmlFormatter::new(out)),
    }
}

/// In-memory writer that can be read back after the formatter is gone
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!("doc".parse::<Format>().unwrap(), Format::Doc);
        assert_eq!("j".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("html".parse::<Format>().unwrap(), Format::Html);
        assert!("xml".parse::<Format>().is_err());
    }

    #[test]
    fn test_shared_buffer_reads_back() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        write!(writer, "hello").unwrap();
        assert_eq!(buffer.contents(), "hello");
    }
}
