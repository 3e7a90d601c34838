//! nginx configuration lexer

use nom::{
    branch::alt,
    bytes::complete::take_while,
    character::complete::char,
    IResult,
};

/// Token types for nginx config
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare word: directive names, unquoted arguments, numbers
    Word(String),
    /// Quoted argument with quotes removed
    Quoted(String),
    /// Open brace {
    OpenBrace,
    /// Close brace }
    CloseBrace,
    /// Semicolon ;
    Semicolon,
    /// Comment
    Comment(String),
}

/// Tokenize nginx configuration, pairing each token with its starting line
pub fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, String> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut remaining = input;

    while !remaining.is_empty() {
        let (rest, _) = skip_horizontal_whitespace(remaining)
            .map_err(|e| format!("Whitespace error at line {}: {:?}", line, e))?;
        remaining = rest;

        if remaining.is_empty() {
            break;
        }

        if let Some(rest) = remaining.strip_prefix("\r\n") {
            remaining = rest;
            line += 1;
            continue;
        }

        if let Some(rest) = remaining.strip_prefix('\n') {
            remaining = rest;
            line += 1;
            continue;
        }

        if remaining.starts_with('#') {
            let (rest, comment) = parse_comment(remaining)
                .map_err(|e| format!("Comment error at line {}: {:?}", line, e))?;
            tokens.push((Token::Comment(comment), line));
            remaining = rest;
            continue;
        }

        if let Some(rest) = remaining.strip_prefix('{') {
            tokens.push((Token::OpenBrace, line));
            remaining = rest;
            continue;
        }

        if let Some(rest) = remaining.strip_prefix('}') {
            tokens.push((Token::CloseBrace, line));
            remaining = rest;
            continue;
        }

        if let Some(rest) = remaining.strip_prefix(';') {
            tokens.push((Token::Semicolon, line));
            remaining = rest;
            continue;
        }

        if remaining.starts_with('"') || remaining.starts_with('\'') {
            let (rest, s) = parse_quoted(remaining)
                .map_err(|_| format!("Unterminated string at line {}", line))?;
            tokens.push((Token::Quoted(s), line));
            // quoted arguments may span lines
            line += remaining[..remaining.len() - rest.len()].matches('\n').count();
            remaining = rest;
            continue;
        }

        let (rest, word) = parse_word(remaining).map_err(|_| {
            format!(
                "Unexpected character at line {}: {:?}",
                line,
                remaining.chars().next()
            )
        })?;
        tokens.push((Token::Word(word), line));
        remaining = rest;
    }

    Ok(tokens)
}

fn skip_horizontal_whitespace(input: &str) -> IResult<&str, &str> {
    take_while(|c: char| c == ' ' || c == '\t' || c == '\r')(input)
}

fn parse_comment(input: &str) -> IResult<&str, String> {
    let (rest, _) = char('#')(input)?;
    let (rest, comment) = take_while(|c: char| c != '\n' && c != '\r')(rest)?;
    Ok((rest, comment.to_string()))
}

fn parse_quoted(input: &str) -> IResult<&str, String> {
    alt((|i| parse_delimited(i, '"'), |i| parse_delimited(i, '\'')))(input)
}

/// Parse a string delimited by `quote`, honouring backslash escapes of the
/// delimiter and of the backslash itself. Other escapes are kept verbatim so
/// regex arguments survive untouched.
fn parse_delimited(input: &str, quote: char) -> IResult<&str, String> {
    let (rest, _) = char(quote)(input)?;
    let mut result = String::new();
    let mut chars = rest.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c == quote {
            return Ok((&rest[idx + c.len_utf8()..], result));
        }
        if c == '\\' {
            match chars.peek() {
                Some(&(_, next)) if next == quote || next == '\\' => {
                    result.push(next);
                    chars.next();
                }
                _ => result.push('\\'),
            }
            continue;
        }
        result.push(c);
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Bare word. Braces end a word except inside a `${name}` variable.
fn parse_word(input: &str) -> IResult<&str, String> {
    let mut end = input.len();
    let mut in_variable = false;
    let mut prev = None;

    for (idx, c) in input.char_indices() {
        if in_variable {
            if c == '}' {
                in_variable = false;
            }
        } else if c == '{' && prev == Some('$') {
            in_variable = true;
        } else if c.is_whitespace() || matches!(c, '{' | '}' | ';' | '#' | '"' | '\'') {
            end = idx;
            break;
        }
        prev = Some(c);
    }

    if end == 0 {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TakeWhile1,
        )));
    }
    Ok((&input[end..], input[..end].to_string()))
}
