//! Regex salvage parser
//!
//! Used only when the structured parser rejects a file. It recovers `server`
//! blocks (with `server_name`, `listen` and `location`/`proxy_pass`) and
//! `upstream` blocks (with their `server` entries). Everything else is
//! dropped. Output from this path is tagged `manual_ok` by the caller.

use super::nginx::Directive;
use super::ParseError;
use regex::Regex;

/// Regexes for the handful of directives the salvage path understands
pub struct FallbackParser {
    server_open: Regex,
    upstream_open: Regex,
    location_open: Regex,
    server_name: Regex,
    listen: Regex,
    proxy_pass: Regex,
    upstream_server: Regex,
}

impl FallbackParser {
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self {
            server_open: Regex::new(r"\bserver\s*\{")?,
            upstream_open: Regex::new(r"\bupstream\s+([^\s{;]+)\s*\{")?,
            location_open: Regex::new(r"\blocation\s+([^{;]+?)\s*\{")?,
            server_name: Regex::new(r"\bserver_name\s+([^;]+);")?,
            listen: Regex::new(r"\blisten\s+([^;]+);")?,
            proxy_pass: Regex::new(r"\bproxy_pass\s+([^;]+);")?,
            upstream_server: Regex::new(r"\bserver\s+([^;{]+);")?,
        })
    }

    /// Extract `server` and `upstream` blocks, in file order
    pub fn salvage(&self, content: &str) -> Vec<Directive> {
        let mut found: Vec<(usize, Directive)> = Vec::new();

        let mut cursor = 0;
        for m in self.server_open.find_iter(content) {
            if m.start() < cursor {
                continue;
            }
            let body_start = m.end();
            let body_end = block_end(content, body_start);
            cursor = body_end;

            let body = &content[body_start..body_end];
            let line = line_at(content, m.start());
            found.push((m.start(), self.server_block(body, line, content, body_start)));
        }

        let mut cursor = 0;
        for caps in self.upstream_open.captures_iter(content) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() < cursor {
                continue;
            }
            let body_start = whole.end();
            let body_end = block_end(content, body_start);
            cursor = body_end;

            let mut upstream = Directive::new("upstream", line_at(content, whole.start()))
                .with_args(vec![name.as_str().to_string()]);
            let mut servers = Vec::new();
            for entry in self.upstream_server.captures_iter(&content[body_start..body_end]) {
                let (Some(entry_match), Some(args)) = (entry.get(0), entry.get(1)) else {
                    continue;
                };
                servers.push(
                    Directive::new("server", line_at(content, body_start + entry_match.start()))
                        .with_args(split_args(args.as_str())),
                );
            }
            upstream.block = Some(servers);
            found.push((whole.start(), upstream));
        }

        found.sort_by_key(|(offset, _)| *offset);
        found.into_iter().map(|(_, d)| d).collect()
    }

    fn server_block(&self, body: &str, line: usize, content: &str, body_offset: usize) -> Directive {
        let mut children = Vec::new();

        for (regex, name) in [(&self.server_name, "server_name"), (&self.listen, "listen")] {
            for caps in regex.captures_iter(body) {
                let (Some(whole), Some(args)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                children.push((
                    whole.start(),
                    Directive::new(name, line_at(content, body_offset + whole.start()))
                        .with_args(split_args(args.as_str())),
                ));
            }
        }

        let mut cursor = 0;
        for caps in self.location_open.captures_iter(body) {
            let (Some(whole), Some(pattern)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() < cursor {
                continue;
            }
            let loc_end = block_end(body, whole.end());
            cursor = loc_end;

            let mut location = Directive::new("location", line_at(content, body_offset + whole.start()))
                .with_args(split_args(pattern.as_str()));
            let loc_body = &body[whole.end()..loc_end];
            let mut inner = Vec::new();
            if let Some(pass) = self.proxy_pass.captures(loc_body) {
                if let (Some(pass_match), Some(target)) = (pass.get(0), pass.get(1)) {
                    let offset = body_offset + whole.end() + pass_match.start();
                    inner.push(
                        Directive::new("proxy_pass", line_at(content, offset))
                            .with_args(vec![target.as_str().trim().to_string()]),
                    );
                }
            }
            location.block = Some(inner);
            children.push((whole.start(), location));
        }

        children.sort_by_key(|(offset, _)| *offset);
        Directive::new("server", line).with_block(children.into_iter().map(|(_, d)| d).collect())
    }
}

/// Byte offset of the `}` closing a block whose body starts at `start`.
/// Braces inside comments and quotes are ignored; an unclosed block runs to
/// the end of the input.
pub(crate) fn block_end(text: &str, start: usize) -> usize {
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    let mut in_comment = false;
    let mut escaped = false;

    for (idx, c) in text[start..].char_indices() {
        if in_comment {
            in_comment = c != '\n';
            continue;
        }
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '#' => in_comment = true,
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return start + idx;
                }
            }
            _ => {}
        }
    }

    text.len()
}

fn line_at(text: &str, offset: usize) -> usize {
    text[..offset].matches('\n').count() + 1
}

fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .map(|a| a.trim_matches(|c| c == '"' || c == '\'').to_string())
        .collect()
}
