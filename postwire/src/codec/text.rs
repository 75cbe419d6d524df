//! Text format literals of structured values.
//!
//! ```text
//! array       {1,2,NULL}  {{"a b",c},{d,e}}  [0:1]={x,y}
//! record      ("123 Easy Street","Easy Town")  (1,,"")
//! range       [1,5)  (,"2020-01-01"]  empty
//! multirange  {[1,3),[5,7)}  {}
//! ```
use std::{borrow::Cow, fmt::Write};

use super::Dimension;

/// Parsed array literal, elements in row major order, `NULL` is [`None`].
#[derive(Debug, PartialEq, Eq)]
pub struct ArrayLiteral {
    pub dims: Vec<Dimension>,
    pub elements: Vec<Option<String>>,
}

/// Parsed range literal, unbounded side is [`None`].
#[derive(Debug, PartialEq, Eq)]
pub enum RangeLiteral {
    Empty,
    Bounds {
        lower: Option<String>,
        lower_inclusive: bool,
        upper: Option<String>,
        upper_inclusive: bool,
    },
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input: input.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), String> {
        match self.bump() {
            Some(found) if found == b => Ok(()),
            Some(found) => Err(format!("expected {:?} found {:?} at {}", b as char, found as char, self.pos - 1)),
            None => Err(format!("expected {:?} found end of input", b as char)),
        }
    }

    fn is_end(&self) -> bool {
        self.pos >= self.input.len()
    }
}

fn into_string(bytes: Vec<u8>) -> Result<String, String> {
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

/// Parse array literal with element delimiter `delim`.
pub fn parse_array(input: &str, delim: u8) -> Result<ArrayLiteral, String> {
    let mut cur = Cursor::new(input);
    cur.skip_ws();

    // optional dimension decoration
    let mut lowers = vec![];
    if cur.peek() == Some(b'[') {
        while cur.peek() == Some(b'[') {
            cur.bump();
            let lower = read_int(&mut cur)?;
            cur.expect(b':')?;
            let upper = read_int(&mut cur)?;
            cur.expect(b']')?;
            lowers.push((lower, upper));
        }
        cur.expect(b'=')?;
        cur.skip_ws();
    }

    let mut counts: Vec<Option<i32>> = vec![];
    let mut elements = vec![];
    parse_array_level(&mut cur, delim, 0, &mut counts, &mut elements)?;

    cur.skip_ws();
    if !cur.is_end() {
        return Err(format!("trailing characters after array at {}", cur.pos));
    }

    if elements.is_empty() {
        return Ok(ArrayLiteral { dims: vec![], elements });
    }

    let mut dims = Vec::with_capacity(counts.len());
    for (i, count) in counts.into_iter().enumerate() {
        let len = count.ok_or("missing array dimension")?;
        let lower = match lowers.get(i) {
            Some(&(lower, upper)) if upper - lower + 1 == len => lower,
            Some(_) => return Err("array dimension decoration does not match".into()),
            None if lowers.is_empty() => 1,
            None => return Err("array dimension decoration does not match".into()),
        };
        dims.push(Dimension { len, lower });
    }

    Ok(ArrayLiteral { dims, elements })
}

fn read_int(cur: &mut Cursor) -> Result<i32, String> {
    let start = cur.pos;
    if cur.peek() == Some(b'-') {
        cur.bump();
    }
    while cur.peek().is_some_and(|b| b.is_ascii_digit()) {
        cur.bump();
    }
    std::str::from_utf8(&cur.input[start..cur.pos])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| format!("invalid array bound at {start}"))
}

fn parse_array_level(
    cur: &mut Cursor,
    delim: u8,
    depth: usize,
    counts: &mut Vec<Option<i32>>,
    out: &mut Vec<Option<String>>,
) -> Result<(), String> {
    cur.expect(b'{')?;
    cur.skip_ws();

    let mut count = 0;
    if cur.peek() == Some(b'}') {
        cur.bump();
    } else {
        loop {
            cur.skip_ws();
            match cur.peek() {
                Some(b'{') => parse_array_level(cur, delim, depth + 1, counts, out)?,
                Some(_) => out.push(array_element(cur, delim)?),
                None => return Err("unterminated array".into()),
            }
            count += 1;
            cur.skip_ws();
            match cur.bump() {
                Some(b'}') => break,
                Some(b) if b == delim => continue,
                Some(b) => return Err(format!("unexpected {:?} in array at {}", b as char, cur.pos - 1)),
                None => return Err("unterminated array".into()),
            }
        }
    }

    if counts.len() <= depth {
        counts.resize(depth + 1, None);
    }
    match counts[depth] {
        None => counts[depth] = Some(count),
        Some(c) if c == count => {},
        Some(_) => return Err("multidimensional arrays must have sub-arrays with matching dimensions".into()),
    }
    Ok(())
}

fn array_element(cur: &mut Cursor, delim: u8) -> Result<Option<String>, String> {
    let mut out = vec![];
    if cur.peek() == Some(b'"') {
        cur.bump();
        loop {
            match cur.bump() {
                Some(b'"') => break,
                Some(b'\\') => out.push(cur.bump().ok_or("unterminated escape")?),
                Some(b) => out.push(b),
                None => return Err("unterminated quoted array element".into()),
            }
        }
        return into_string(out).map(Some);
    }

    let mut escaped = false;
    // trailing whitespace is not part of an unquoted element
    let mut significant = 0;
    loop {
        match cur.peek() {
            Some(b) if b == delim || b == b'}' => break,
            Some(b'\\') => {
                cur.bump();
                out.push(cur.bump().ok_or("unterminated escape")?);
                escaped = true;
                significant = out.len();
            },
            Some(b'{' | b'"') => return Err(format!("unexpected character in array element at {}", cur.pos)),
            Some(b) => {
                cur.bump();
                out.push(b);
                if !b.is_ascii_whitespace() {
                    significant = out.len();
                }
            },
            None => return Err("unterminated array".into()),
        }
    }
    out.truncate(significant);

    if !escaped && out.eq_ignore_ascii_case(b"NULL") {
        return Ok(None);
    }
    into_string(out).map(Some)
}

/// Read a record field or range bound, ends before any of `terminators`.
///
/// Empty unquoted input is [`None`].
fn quoted_item(cur: &mut Cursor, terminators: &[u8]) -> Result<Option<String>, String> {
    let mut out = vec![];
    let mut any = false;
    let mut in_quotes = false;
    loop {
        let Some(b) = cur.peek() else {
            return Err("unterminated literal".into());
        };
        match b {
            b'"' if in_quotes && cur.input.get(cur.pos + 1) == Some(&b'"') => {
                cur.pos += 2;
                out.push(b'"');
            },
            b'"' => {
                cur.bump();
                in_quotes = !in_quotes;
                any = true;
            },
            b'\\' => {
                cur.bump();
                out.push(cur.bump().ok_or("unterminated escape")?);
                any = true;
            },
            b if !in_quotes && terminators.contains(&b) => break,
            b => {
                cur.bump();
                out.push(b);
                any = true;
            },
        }
    }
    match any {
        true => into_string(out).map(Some),
        false => Ok(None),
    }
}

/// Parse record literal, empty field is `NULL`.
pub fn parse_record(input: &str) -> Result<Vec<Option<String>>, String> {
    let mut cur = Cursor::new(input.trim());
    cur.expect(b'(')?;
    let mut fields = vec![];
    loop {
        fields.push(quoted_item(&mut cur, b",)")?);
        match cur.bump() {
            Some(b',') => continue,
            Some(b')') => break,
            _ => return Err("unterminated record".into()),
        }
    }
    if !cur.is_end() {
        return Err("trailing characters after record".into());
    }
    Ok(fields)
}

/// Parse range literal.
pub fn parse_range(input: &str) -> Result<RangeLiteral, String> {
    let mut cur = Cursor::new(input);
    let range = range_at(&mut cur)?;
    cur.skip_ws();
    if !cur.is_end() {
        return Err("trailing characters after range".into());
    }
    Ok(range)
}

fn range_at(cur: &mut Cursor) -> Result<RangeLiteral, String> {
    cur.skip_ws();
    let rest = &cur.input[cur.pos..];
    if rest.len() >= 5 && rest[..5].eq_ignore_ascii_case(b"empty") {
        cur.pos += 5;
        return Ok(RangeLiteral::Empty);
    }

    let lower_inclusive = match cur.bump() {
        Some(b'[') => true,
        Some(b'(') => false,
        _ => return Err("range must start with \"[\" or \"(\"".into()),
    };
    let lower = quoted_item(cur, b",")?;
    cur.expect(b',')?;
    let upper = quoted_item(cur, b"])")?;
    let upper_inclusive = match cur.bump() {
        Some(b']') => true,
        Some(b')') => false,
        _ => return Err("range must end with \"]\" or \")\"".into()),
    };

    Ok(RangeLiteral::Bounds { lower, lower_inclusive, upper, upper_inclusive })
}

/// Parse multirange literal.
pub fn parse_multirange(input: &str) -> Result<Vec<RangeLiteral>, String> {
    let mut cur = Cursor::new(input);
    cur.skip_ws();
    cur.expect(b'{')?;
    cur.skip_ws();
    let mut ranges = vec![];
    if cur.peek() == Some(b'}') {
        cur.bump();
    } else {
        loop {
            ranges.push(range_at(&mut cur)?);
            cur.skip_ws();
            match cur.bump() {
                Some(b',') => continue,
                Some(b'}') => break,
                _ => return Err("unterminated multirange".into()),
            }
        }
    }
    cur.skip_ws();
    if !cur.is_end() {
        return Err("trailing characters after multirange".into());
    }
    Ok(ranges)
}

/// Quote array element if required.
pub fn quote_array_element(value: &str, delim: u8) -> Cow<'_, str> {
    let needs_quote = value.is_empty()
        || value.eq_ignore_ascii_case("NULL")
        || value
            .bytes()
            .any(|b| matches!(b, b'{' | b'}' | b'"' | b'\\') || b == delim || b.is_ascii_whitespace());
    match needs_quote {
        true => Cow::Owned(quote(value, |b, out| {
            if matches!(b, '"' | '\\') {
                out.push('\\');
            }
        })),
        false => Cow::Borrowed(value),
    }
}

/// Quote record field or range bound if required.
pub fn quote_item(value: &str) -> Cow<'_, str> {
    let needs_quote = value.is_empty()
        || value
            .bytes()
            .any(|b| matches!(b, b',' | b'(' | b')' | b'[' | b']' | b'{' | b'}' | b'"' | b'\\') || b.is_ascii_whitespace());
    match needs_quote {
        // doubled, like record_out
        true => Cow::Owned(quote(value, |b, out| {
            if matches!(b, '"' | '\\') {
                out.push(b);
            }
        })),
        false => Cow::Borrowed(value),
    }
}

fn quote(value: &str, escape: impl Fn(char, &mut String)) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        escape(c, &mut out);
        out.push(c);
    }
    out.push('"');
    out
}

/// Write array literal from already encoded elements.
pub fn write_array(dims: &[Dimension], elements: &[Option<String>], delim: u8) -> String {
    let mut out = String::new();
    if dims.is_empty() {
        out.push_str("{}");
        return out;
    }
    if dims.iter().any(|d| d.lower != 1) {
        for d in dims {
            let _ = write!(out, "[{}:{}]", d.lower, d.lower + d.len - 1);
        }
        out.push('=');
    }
    let mut iter = elements.iter();
    write_array_level(&mut out, dims, &mut iter, delim as char);
    out
}

fn write_array_level<'a>(
    out: &mut String,
    dims: &[Dimension],
    elements: &mut impl Iterator<Item = &'a Option<String>>,
    delim: char,
) {
    out.push('{');
    for i in 0..dims[0].len {
        if i > 0 {
            out.push(delim);
        }
        if dims.len() > 1 {
            write_array_level(out, &dims[1..], elements, delim);
            continue;
        }
        match elements.next() {
            Some(Some(value)) => out.push_str(&quote_array_element(value, delim as u8)),
            Some(None) | None => out.push_str("NULL"),
        }
    }
    out.push('}');
}

/// Write record literal from already encoded fields.
pub fn write_record(fields: &[Option<String>]) -> String {
    let mut out = String::from("(");
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if let Some(field) = field {
            out.push_str(&quote_item(field));
        }
    }
    out.push(')');
    out
}

/// Write range literal from already encoded bounds.
pub fn write_range(range: &RangeLiteral, out: &mut String) {
    match range {
        RangeLiteral::Empty => out.push_str("empty"),
        RangeLiteral::Bounds { lower, lower_inclusive, upper, upper_inclusive } => {
            out.push(if *lower_inclusive { '[' } else { '(' });
            if let Some(lower) = lower {
                out.push_str(&quote_item(lower));
            }
            out.push(',');
            if let Some(upper) = upper {
                out.push_str(&quote_item(upper));
            }
            out.push(if *upper_inclusive { ']' } else { ')' });
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn some(s: &str) -> Option<String> {
        Some(s.to_owned())
    }

    #[test]
    fn array_literal() {
        let arr = parse_array(r#"{1, "a b" ,NULL,"NULL",\"q\"}"#, b',').unwrap();
        assert_eq!(arr.dims, [Dimension { len: 5, lower: 1 }]);
        assert_eq!(arr.elements, [some("1"), some("a b"), None, some("NULL"), some("\"q\"")]);

        let arr = parse_array("{{1,2},{3,4},{5,6}}", b',').unwrap();
        assert_eq!(arr.dims, [Dimension { len: 3, lower: 1 }, Dimension { len: 2, lower: 1 }]);
        assert_eq!(arr.elements.len(), 6);

        let arr = parse_array("[0:1]={x,y}", b',').unwrap();
        assert_eq!(arr.dims, [Dimension { len: 2, lower: 0 }]);

        let arr = parse_array("{(1,2);(3,4)}", b';').unwrap();
        assert_eq!(arr.elements, [some("(1,2)"), some("(3,4)")]);

        assert_eq!(parse_array("{}", b',').unwrap().dims, []);
        assert!(parse_array("{{1,2},{3}}", b',').is_err());
        assert!(parse_array("{1,2", b',').is_err());
    }

    #[test]
    fn array_write() {
        let dims = [Dimension { len: 2, lower: 1 }, Dimension { len: 2, lower: 1 }];
        let elements = [some("a"), some("b c"), None, some("")];
        let literal = write_array(&dims, &elements, b',');
        assert_eq!(literal, r#"{{a,"b c"},{NULL,""}}"#);
        assert_eq!(parse_array(&literal, b',').unwrap().elements, elements);
    }

    #[test]
    fn record_literal() {
        let fields = parse_record(r#"("123 Easy Street","Easy Town")"#).unwrap();
        assert_eq!(fields, [some("123 Easy Street"), some("Easy Town")]);

        let fields = parse_record(r#"(1,,"","a""b",c\,d)"#).unwrap();
        assert_eq!(fields, [some("1"), None, some(""), some("a\"b"), some("c,d")]);

        let literal = write_record(&fields);
        assert_eq!(literal, r#"(1,,"","a""b","c,d")"#);
        assert_eq!(parse_record(&literal).unwrap(), fields);
    }

    #[test]
    fn range_literal() {
        assert_eq!(parse_range(" empty ").unwrap(), RangeLiteral::Empty);
        assert_eq!(parse_range("[1,5)").unwrap(), RangeLiteral::Bounds {
            lower: some("1"),
            lower_inclusive: true,
            upper: some("5"),
            upper_inclusive: false,
        });
        assert_eq!(parse_range(r#"(,"2020-01-01 00:00:00"]"#).unwrap(), RangeLiteral::Bounds {
            lower: None,
            lower_inclusive: false,
            upper: some("2020-01-01 00:00:00"),
            upper_inclusive: true,
        });
        assert!(parse_range("1,5").is_err());
    }

    #[test]
    fn multirange_literal() {
        let ranges = parse_multirange("{[1,3), [5,7)}").unwrap();
        assert_eq!(ranges.len(), 2);
        assert!(parse_multirange("{}").unwrap().is_empty());

        let mut out = String::new();
        write_range(&ranges[1], &mut out);
        assert_eq!(out, "[5,7)");
    }
}
