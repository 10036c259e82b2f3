//! The flat relation files an index is stored in.
//!
//! Each table is a series of numbered files `<stem>-<n>.sql` holding batched
//! statements:
//!
//! ```text
//! REPLACE INTO Tokens (TokenPK,Token,HashValue) VALUES
//! (1,"search",1093622351),
//! (2,"engin",187001236);
//! ```
//!
//! Only lines starting with `(` carry data. The parser here is a small scanner
//! over digit runs and quoted spans in a fixed field order, not a SQL parser.

use std::str::FromStr;

use crate::{DocId, TermHash, TermId};

pub const EXTENSION: &str = "sql";
/// Schema file written next to the data files, never parsed as data.
pub const DDL_FILE: &str = "ddl.sql";
pub const STATEMENT_END: &str = ";";
pub const ROW_SEPARATOR: &str = ",";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Documents,
    Tokens,
    Intersection,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Documents, Table::Tokens, Table::Intersection];

    pub fn file_stem(self) -> &'static str {
        match self {
            Table::Documents => "dml_documents",
            Table::Tokens => "dml_tokens",
            Table::Intersection => "dml_intersection",
        }
    }

    pub fn file_name(self, number: u32) -> String {
        format!("{}-{}.{}", self.file_stem(), number, EXTENSION)
    }

    /// Statement header preceding each batch of rows.
    pub fn header(self) -> &'static str {
        match self {
            Table::Documents => "REPLACE INTO Documents (DocumentID,HighestTermFreq,Title,Path) VALUES ",
            Table::Tokens => "REPLACE INTO Tokens (TokenPK,Token,HashValue) VALUES ",
            Table::Intersection => "REPLACE INTO Intersection (TokenFK,DocumentID,Frequency) VALUES ",
        }
    }

    pub fn ddl(self) -> &'static str {
        match self {
            Table::Documents => {
                "CREATE TABLE IF NOT EXISTS Documents (\n  DocumentID INT NOT NULL PRIMARY KEY,\n  HighestTermFreq INT NOT NULL,\n  Title VARCHAR(128) NOT NULL,\n  Path VARCHAR(1024) NOT NULL\n);"
            }
            Table::Tokens => {
                "CREATE TABLE IF NOT EXISTS Tokens (\n  TokenPK INT NOT NULL PRIMARY KEY,\n  Token VARCHAR(64) NOT NULL,\n  HashValue BIGINT NOT NULL\n);"
            }
            Table::Intersection => {
                "CREATE TABLE IF NOT EXISTS Intersection (\n  TokenFK INT NOT NULL,\n  DocumentID INT NOT NULL,\n  Frequency INT NOT NULL,\n  PRIMARY KEY (TokenFK, DocumentID)\n);"
            }
        }
    }

    /// Classifies an index file by name. The schema file and anything without
    /// the index extension yield `None`.
    pub fn classify(file_name: &str) -> Option<Table> {
        let name = file_name.to_ascii_lowercase();
        if name == DDL_FILE || !name.ends_with(&format!(".{EXTENSION}")) {
            return None;
        }
        if name.contains("intersection") {
            Some(Table::Intersection)
        } else if name.contains("tokens") {
            Some(Table::Tokens)
        } else {
            Some(Table::Documents)
        }
    }
}

/// A row of one of the three tables.
pub trait Row: Sized {
    const TABLE: Table;

    fn encode(&self) -> String;

    /// Parses one data line; the error is a human readable reason.
    fn parse(line: &str) -> Result<Self, String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    pub id: DocId,
    pub highest_term_frequency: u32,
    pub title: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRow {
    pub id: TermId,
    pub text: String,
    pub hash: TermHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntersectionRow {
    pub term_id: TermId,
    pub doc_id: DocId,
    pub frequency: u32,
}

impl Row for DocumentRow {
    const TABLE: Table = Table::Documents;

    fn encode(&self) -> String {
        format!("({},{},{},{})", self.id, self.highest_term_frequency, quote(&self.title), quote(&self.path))
    }

    fn parse(line: &str) -> Result<Self, String> {
        let mut s = RowScanner::new(line);
        s.open()?;
        let id = s.int("document id")?;
        s.comma()?;
        let highest_term_frequency = s.int("highest term frequency")?;
        s.comma()?;
        let title = s.string("title")?;
        s.comma()?;
        let path = s.string("path")?;
        s.close()?;
        Ok(Self { id, highest_term_frequency, title, path })
    }
}

impl Row for TokenRow {
    const TABLE: Table = Table::Tokens;

    fn encode(&self) -> String {
        format!("({},{},{})", self.id, quote(&self.text), self.hash)
    }

    fn parse(line: &str) -> Result<Self, String> {
        let mut s = RowScanner::new(line);
        s.open()?;
        let id = s.int("token id")?;
        s.comma()?;
        let text = s.string("token")?;
        s.comma()?;
        let hash = s.int("hash value")?;
        s.close()?;
        Ok(Self { id, text, hash })
    }
}

impl Row for IntersectionRow {
    const TABLE: Table = Table::Intersection;

    fn encode(&self) -> String {
        format!("({},{},{})", self.term_id, self.doc_id, self.frequency)
    }

    fn parse(line: &str) -> Result<Self, String> {
        let mut s = RowScanner::new(line);
        s.open()?;
        let term_id = s.int("token id")?;
        s.comma()?;
        let doc_id = s.int("document id")?;
        s.comma()?;
        let frequency = s.int("frequency")?;
        s.close()?;
        Ok(Self { term_id, doc_id, frequency })
    }
}

/// True for lines holding a row; statement headers and blank lines are not.
pub fn is_data_line(line: &str) -> bool {
    line.starts_with('(')
}

/// Double-quotes `s`, escaping backslashes, quotes and line breaks.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

struct RowScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> RowScanner<'a> {
    fn new(line: &'a str) -> Self {
        Self { bytes: line.as_bytes(), pos: 0 }
    }

    fn expect(&mut self, want: u8) -> Result<(), String> {
        match self.bytes.get(self.pos) {
            Some(&b) if b == want => {
                self.pos += 1;
                Ok(())
            }
            Some(&b) => Err(format!("expected '{}' at column {}, found '{}'", want as char, self.pos + 1, b as char)),
            None => Err(format!("expected '{}' at column {}, found end of line", want as char, self.pos + 1)),
        }
    }

    fn open(&mut self) -> Result<(), String> {
        self.expect(b'(')
    }

    fn comma(&mut self) -> Result<(), String> {
        self.expect(b',')
    }

    /// Closing parenthesis; a trailing separator or terminator may follow.
    fn close(&mut self) -> Result<(), String> {
        self.expect(b')')?;
        let rest = std::str::from_utf8(&self.bytes[self.pos..]).unwrap_or("").trim();
        if rest.is_empty() || rest == ROW_SEPARATOR || rest == STATEMENT_END {
            Ok(())
        } else {
            Err(format!("unexpected trailing text '{rest}'"))
        }
    }

    fn int<T: FromStr>(&mut self, field: &str) -> Result<T, String> {
        let start = self.pos;
        while self.bytes.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(format!("missing {field} at column {}", start + 1));
        }
        let digits = std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|e| e.to_string())?;
        digits.parse().map_err(|_| format!("{field} '{digits}' out of range"))
    }

    fn string(&mut self, field: &str) -> Result<String, String> {
        self.expect(b'"').map_err(|e| format!("{field}: {e}"))?;
        let mut out = Vec::new();
        loop {
            match self.bytes.get(self.pos) {
                None => return Err(format!("unterminated {field}")),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    let escaped = self.bytes.get(self.pos + 1).ok_or_else(|| format!("dangling escape in {field}"))?;
                    out.push(match escaped {
                        b'n' => b'\n',
                        b'r' => b'\r',
                        other => *other,
                    });
                    self.pos += 2;
                }
                Some(&b) => {
                    out.push(b);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8(out).map_err(|e| format!("{field} is not UTF-8: {e}"))
    }
}
