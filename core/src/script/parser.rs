//! PEST-based parser for stream scripts

use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use super::types::{Module, Stmt};
use crate::types::Handle;

/// Module name used when a script does not declare one
pub const DEFAULT_MODULE: &str = "main";

#[derive(Parser)]
#[grammar = "script/script.pest"]
struct ScriptParser;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    /// 1-based (line, column), when known
    pub position: Option<(usize, usize)>,
}

impl ParseError {
    fn build(message: impl Into<String>, pair: &Pair<Rule>) -> Self {
        Self {
            message: message.into(),
            position: Some(pair.line_col()),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.position {
            Some((line, col)) => write!(f, "{}:{}: {}", line, col, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let position = match err.line_col {
            pest::error::LineColLocation::Pos(pos) => pos,
            pest::error::LineColLocation::Span(start, _) => start,
        };
        Self {
            message: err.variant.message().into_owned(),
            position: Some(position),
        }
    }
}

impl From<ParseError> for crate::error::BridgeError {
    fn from(err: ParseError) -> Self {
        crate::error::BridgeError::Interpreter(err.to_string())
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Public API ===================== */

pub fn parse_module(source: &str) -> ParseResult<Module> {
    let program = ScriptParser::parse(Rule::program, source)?
        .next()
        .ok_or_else(|| ParseError {
            message: "empty parse".to_string(),
            position: None,
        })?;

    let mut name = DEFAULT_MODULE.to_string();
    let mut body = Vec::new();
    for pair in program.into_inner() {
        match pair.as_rule() {
            Rule::module_decl => {
                let string = next_inner(pair)?;
                name = build_string(string);
            }
            Rule::EOI => {}
            _ => body.push(build_statement(pair)?),
        }
    }

    Ok(Module {
        name,
        body: Stmt::Block { body },
    })
}

/* ===================== AST Builder ===================== */

fn build_statement(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let rule = pair.as_rule();
    let outer = pair.clone();
    let mut inner = pair.into_inner();
    let mut next = || {
        inner
            .next()
            .ok_or_else(|| ParseError::build("incomplete statement", &outer))
    };

    match rule {
        Rule::bind_stmt => Ok(Stmt::Bind {
            handle: build_handle(next()?)?,
            target: build_string(next()?),
        }),
        Rule::write_stmt => Ok(Stmt::Write {
            handle: build_handle(next()?)?,
            text: build_string(next()?),
        }),
        Rule::line_stmt => Ok(Stmt::Line {
            from: build_handle(next()?)?,
            to: build_handle(next()?)?,
        }),
        Rule::copy_stmt => Ok(Stmt::Copy {
            from: build_handle(next()?)?,
            to: build_handle(next()?)?,
        }),
        Rule::random_stmt => Ok(Stmt::Random {
            handle: build_handle(next()?)?,
        }),
        Rule::repeat_stmt => {
            let count = build_number(next()?)?;
            let block = next()?;
            let body = block
                .into_inner()
                .map(build_statement)
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Stmt::Repeat {
                count,
                body: Box::new(Stmt::Block { body }),
            })
        }
        other => Err(ParseError::build(
            format!("unexpected {:?}", other),
            &outer,
        )),
    }
}

fn next_inner(pair: Pair<Rule>) -> ParseResult<Pair<Rule>> {
    let outer = pair.clone();
    pair.into_inner()
        .next()
        .ok_or_else(|| ParseError::build("missing operand", &outer))
}

fn build_number(pair: Pair<Rule>) -> ParseResult<u32> {
    pair.as_str()
        .parse()
        .map_err(|_| ParseError::build(format!("number out of range: {}", pair.as_str()), &pair))
}

fn build_handle(pair: Pair<Rule>) -> ParseResult<Handle> {
    build_number(pair).map(Handle)
}

/// Decode a `string` pair, resolving escapes
fn build_string(pair: Pair<Rule>) -> String {
    let raw = pair
        .into_inner()
        .next()
        .map(|inner| inner.as_str())
        .unwrap_or_default();

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_every_statement() {
        let source = r#"
            module "greeter"
            bind 3 "<sys>"   # console
            write 3 "Name? "
            line 3 -> 4
            copy 5 -> 3
            random 3
            repeat 2 { write 3 "." }
        "#;
        let module = parse_module(source).unwrap();

        assert_eq!(module.name, "greeter");
        assert_eq!(
            module.body,
            Stmt::Block {
                body: vec![
                    Stmt::Bind {
                        handle: Handle(3),
                        target: "<sys>".to_string()
                    },
                    Stmt::Write {
                        handle: Handle(3),
                        text: "Name? ".to_string()
                    },
                    Stmt::Line {
                        from: Handle(3),
                        to: Handle(4)
                    },
                    Stmt::Copy {
                        from: Handle(5),
                        to: Handle(3)
                    },
                    Stmt::Random { handle: Handle(3) },
                    Stmt::Repeat {
                        count: 2,
                        body: Box::new(Stmt::Block {
                            body: vec![Stmt::Write {
                                handle: Handle(3),
                                text: ".".to_string()
                            }]
                        }),
                    },
                ]
            }
        );
    }

    #[test]
    fn test_module_name_defaults_to_main() {
        let module = parse_module("write 1 \"x\"").unwrap();
        assert_eq!(module.name, DEFAULT_MODULE);
    }

    #[test]
    fn test_string_escapes() {
        let module = parse_module(r#"write 1 "a\n\t\"q\"\\""#).unwrap();
        let Stmt::Block { body } = module.body else {
            panic!("expected block");
        };
        assert_eq!(
            body[0],
            Stmt::Write {
                handle: Handle(1),
                text: "a\n\t\"q\"\\".to_string()
            }
        );
    }

    #[test]
    fn test_errors_carry_position() {
        let err = parse_module("bind 1 \"a\"\nwrite x \"b\"").unwrap_err();
        assert_eq!(err.position.map(|(line, _)| line), Some(2));

        let err = parse_module("write 99999999999 \"x\"").unwrap_err();
        assert!(err.message.contains("out of range"));

        assert!(parse_module(r#"write 1 "\q""#).is_err());
    }
}
