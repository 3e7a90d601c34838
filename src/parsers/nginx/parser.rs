//! nginx configuration parser

use super::lexer::{tokenize, Token};
use super::Directive;
use crate::parsers::{ConfigParser, ParseError, ParseReport, ParseStatus};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Structured nginx parser producing a full directive tree
pub struct NginxParser;

impl NginxParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse configuration text into top-level directives
    pub fn parse_str(content: &str, file: &Path) -> Result<Vec<Directive>, ParseError> {
        let tokens = tokenize(content).map_err(|e| ParseError::Syntax {
            file: file.to_path_buf(),
            line: 0,
            message: e,
        })?;
        Self::parse_tokens(&tokens, file)
    }

    fn parse_tokens(tokens: &[(Token, usize)], file: &Path) -> Result<Vec<Directive>, ParseError> {
        let mut directives = Vec::new();
        let mut pos = 0;

        while pos < tokens.len() {
            if let (Token::CloseBrace, line) = &tokens[pos] {
                return Err(ParseError::Syntax {
                    file: file.to_path_buf(),
                    line: *line,
                    message: "unexpected \"}\"".to_string(),
                });
            }
            let (directive, new_pos) = Self::parse_directive(tokens, pos, file)?;
            if let Some(d) = directive {
                directives.push(d);
            }
            pos = new_pos;
        }

        Ok(directives)
    }

    /// Parse a single directive (simple or block)
    fn parse_directive(
        tokens: &[(Token, usize)],
        start: usize,
        file: &Path,
    ) -> Result<(Option<Directive>, usize), ParseError> {
        let mut pos = start;

        while let Some((Token::Comment(_), _)) = tokens.get(pos) {
            pos += 1;
        }

        let (name, line) = match tokens.get(pos) {
            None => return Ok((None, pos)),
            Some((Token::Word(name), line)) => (name.clone(), *line),
            Some((Token::CloseBrace, _)) => return Ok((None, pos)),
            Some((token, line)) => {
                return Err(ParseError::Syntax {
                    file: file.to_path_buf(),
                    line: *line,
                    message: format!("expected directive name, got {:?}", token),
                })
            }
        };
        pos += 1;

        let mut directive = Directive::new(name, line);

        while let Some((token, token_line)) = tokens.get(pos) {
            match token {
                Token::Word(arg) | Token::Quoted(arg) => {
                    directive.args.push(arg.clone());
                    pos += 1;
                }
                Token::Comment(_) => pos += 1,
                Token::Semicolon => {
                    return Ok((Some(directive), pos + 1));
                }
                Token::OpenBrace => {
                    pos += 1;
                    let mut block = Vec::new();
                    loop {
                        match tokens.get(pos) {
                            None => {
                                return Err(ParseError::Syntax {
                                    file: file.to_path_buf(),
                                    line,
                                    message: format!(
                                        "unexpected end of file, expecting \"}}\" for \"{}\"",
                                        directive.name
                                    ),
                                })
                            }
                            Some((Token::CloseBrace, _)) => {
                                pos += 1;
                                break;
                            }
                            Some(_) => {
                                let (child, new_pos) = Self::parse_directive(tokens, pos, file)?;
                                if let Some(d) = child {
                                    block.push(d);
                                }
                                pos = new_pos;
                            }
                        }
                    }
                    directive.block = Some(block);
                    return Ok((Some(directive), pos));
                }
                Token::CloseBrace => {
                    return Err(ParseError::Syntax {
                        file: file.to_path_buf(),
                        line: *token_line,
                        message: format!("directive \"{}\" is not terminated by \";\"", directive.name),
                    })
                }
            }
        }

        Err(ParseError::Syntax {
            file: file.to_path_buf(),
            line,
            message: format!("directive \"{}\" is not terminated by \";\"", directive.name),
        })
    }
}

impl Default for NginxParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigParser for NginxParser {
    fn parse(&self, path: &Path) -> ParseReport {
        let outcome = fs::read_to_string(path)
            .map_err(ParseError::from)
            .and_then(|content| Self::parse_str(&content, path));

        match outcome {
            Ok(directives) => {
                debug!(path = %path.display(), count = directives.len(), "structured parse ok");
                ParseReport::single(path, ParseStatus::Ok, directives, Vec::new())
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "structured parse failed");
                ParseReport::single(path, ParseStatus::Error, Vec::new(), vec![e.to_string()])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(input: &str) -> Result<Vec<Directive>, ParseError> {
        NginxParser::parse_str(input, Path::new("test.conf"))
    }

    #[test]
    fn test_parse_simple_directive() {
        let directives = parse("worker_processes 4;").unwrap();
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].name, "worker_processes");
        assert_eq!(directives[0].args, vec!["4"]);
        assert!(!directives[0].is_block());
    }

    #[test]
    fn test_parse_nested_blocks() {
        let input = r#"
            http {
                server {
                    location / {
                        proxy_pass http://backend;
                    }
                }
            }
        "#;
        let directives = parse(input).unwrap();
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].name, "http");
        assert_eq!(directives[0].line, 2);

        let server = &directives[0].children()[0];
        assert_eq!(server.name, "server");
        let location = server.find_directive("location").unwrap();
        assert_eq!(location.args, vec!["/"]);
        assert_eq!(location.children()[0].name, "proxy_pass");
        assert_eq!(location.children()[0].line, 5);
    }

    #[test]
    fn test_empty_block_is_still_a_block() {
        let directives = parse("server {}").unwrap();
        assert!(directives[0].is_block());
        assert!(directives[0].children().is_empty());
    }

    #[test]
    fn test_missing_semicolon_is_error() {
        let err = parse("server {\n listen 80\n}").unwrap_err();
        match err {
            ParseError::Syntax { line, .. } => assert_eq!(line, 3),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unbalanced_braces_are_errors() {
        assert!(parse("http {\n server {\n").is_err());
        assert!(parse("}").is_err());
    }

    #[test]
    fn test_report_for_missing_file() {
        let report = NginxParser::new().parse(&PathBuf::from("/nonexistent/nginx.conf"));
        assert_eq!(report.status, ParseStatus::Error);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.config[0].status, ParseStatus::Error);
        assert!(report.config[0].parsed.is_empty());
    }
}
