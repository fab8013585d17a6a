//! Command line tokenizer and UID set parsing for the fake server.
//!
//! A command line is `tag NAME arg...`. Arguments are atoms, quoted
//! strings (unescaped here) or parenthesized groups, which are kept
//! verbatim with their parentheses:
//!
//! ```text
//!   A0004 UID FETCH 1:4 (UID X-GM-MSGID FLAGS BODY.PEEK[])
//!   -> tag "A0004", name "UID",
//!      args ["FETCH", "1:4", "(UID X-GM-MSGID FLAGS BODY.PEEK[])"]
//! ```

/// One parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub tag: String,
    /// Upper-cased command name.
    pub name: String,
    pub args: Vec<String>,
}

/// Parse a command line. `None` when there is no tag or no name, or
/// when a quote or parenthesis is left open.
pub fn parse_command(line: &str) -> Option<Command> {
    let mut tokens = tokenize(line.trim_end_matches(['\r', '\n']))?.into_iter();
    let tag = tokens.next()?;
    let name = tokens.next()?.to_ascii_uppercase();
    Some(Command {
        tag,
        name,
        args: tokens.collect(),
    })
}

fn tokenize(line: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next()? {
                        '\\' => text.push(chars.next()?),
                        '"' => break,
                        other => text.push(other),
                    }
                }
                tokens.push(text);
            }
            '(' => {
                let mut depth = 0usize;
                let mut group = String::new();
                loop {
                    let c = chars.next()?;
                    group.push(c);
                    match c {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                tokens.push(group);
            }
            _ => {
                let mut atom = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ' ' {
                        break;
                    }
                    atom.push(c);
                    chars.next();
                }
                tokens.push(atom);
            }
        }
    }

    Some(tokens)
}

/// Parse a UID set such as `1:4,7,9:*` into inclusive ranges.
///
/// `*` stands for the highest UID in the folder (`max_uid`). As in
/// RFC 3501, `n:*` with `n` above the highest UID still matches the
/// highest UID, because a range is the same whichever end comes first.
pub fn parse_uid_set(set: &str, max_uid: u32) -> Option<Vec<(u32, u32)>> {
    let value = |s: &str| -> Option<u32> {
        if s == "*" { Some(max_uid) } else { s.parse().ok() }
    };

    set.split(',')
        .map(|part| {
            let (a, b) = match part.split_once(':') {
                Some((a, b)) => (value(a)?, value(b)?),
                None => {
                    let v = value(part)?;
                    (v, v)
                }
            };
            Some((a.min(b), a.max(b)))
        })
        .collect()
}

pub fn in_uid_set(ranges: &[(u32, u32)], uid: u32) -> bool {
    ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&uid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_name_and_quoted_args() {
        let cmd = parse_command("A1 login \"me@example.com\" \"p\\\"w\"\r\n").unwrap();
        assert_eq!(cmd.tag, "A1");
        assert_eq!(cmd.name, "LOGIN");
        assert_eq!(cmd.args, vec!["me@example.com", "p\"w"]);
    }

    #[test]
    fn keeps_parenthesized_groups_whole() {
        let cmd =
            parse_command("A2 UID FETCH 5:* (UID X-GM-LABELS BODY.PEEK[HEADER.FIELDS (SUBJECT)])")
                .unwrap();
        assert_eq!(
            cmd.args,
            vec![
                "FETCH",
                "5:*",
                "(UID X-GM-LABELS BODY.PEEK[HEADER.FIELDS (SUBJECT)])"
            ]
        );
    }

    #[test]
    fn unbalanced_input_is_rejected() {
        assert!(parse_command("A3 EXAMINE \"INBOX").is_none());
        assert!(parse_command("A4 UID FETCH 1 (UID").is_none());
        assert!(parse_command("A5").is_none());
    }

    #[test]
    fn star_range_always_covers_highest_uid() {
        let ranges = parse_uid_set("10:*", 4).unwrap();
        assert!(in_uid_set(&ranges, 4));
        assert!(!in_uid_set(&ranges, 3));
    }

    #[test]
    fn mixed_set() {
        let ranges = parse_uid_set("1:2,7", 9).unwrap();
        assert!(in_uid_set(&ranges, 2));
        assert!(!in_uid_set(&ranges, 3));
        assert!(in_uid_set(&ranges, 7));
        assert!(parse_uid_set("x", 9).is_none());
    }
}
