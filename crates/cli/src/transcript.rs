//! Plain-text transcript format.
//!
//! ```text
//! # comments and blank lines are ignored
//! system: You are terse.
//! user: Deploy finished at 10:42.
//! assistant(3.5): Noted.
//!   continuation lines are appended to the previous turn
//! ```
//!
//! The optional number after the role is an explicit importance score.

use membound_core::Role;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub importance: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("failed to read transcript {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: text before the first role prefix")]
    Orphan { line: usize },

    #[error("line {line}: invalid importance '{raw}'")]
    Importance { line: usize, raw: String },
}

/// Read a transcript from `path`, or stdin when `path` is `-`.
pub async fn load(path: &Path) -> Result<Vec<Turn>, TranscriptError> {
    let read_err = |source| TranscriptError::Read {
        path: path.display().to_string(),
        source,
    };

    let content = if path.as_os_str() == "-" {
        tokio::task::spawn_blocking(|| std::io::read_to_string(std::io::stdin()))
            .await
            .map_err(|e| read_err(std::io::Error::other(e)))?
            .map_err(read_err)?
    } else {
        tokio::fs::read_to_string(path).await.map_err(read_err)?
    };
    parse(&content)
}

pub fn parse(content: &str) -> Result<Vec<Turn>, TranscriptError> {
    let mut turns: Vec<Turn> = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        match header(trimmed, line_no)? {
            Some((role, importance, text)) => turns.push(Turn {
                role,
                text: text.to_string(),
                importance,
            }),
            None => {
                let Some(last) = turns.last_mut() else {
                    return Err(TranscriptError::Orphan { line: line_no });
                };
                last.text.push('\n');
                last.text.push_str(trimmed);
            }
        }
    }

    Ok(turns)
}

/// Split `role(score): text`. `None` when the line has no role prefix.
fn header(line: &str, line_no: usize) -> Result<Option<(Role, Option<f64>, &str)>, TranscriptError> {
    let Some((head, text)) = line.split_once(':') else {
        return Ok(None);
    };

    let (name, score) = match head.split_once('(') {
        Some((name, rest)) => match rest.strip_suffix(')') {
            Some(score) => (name, Some(score)),
            None => return Ok(None),
        },
        None => (head, None),
    };

    let role = match name.trim() {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        "system" => Role::System,
        _ => return Ok(None),
    };

    let importance = score
        .map(|raw| {
            raw.trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| TranscriptError::Importance {
                    line: line_no,
                    raw: raw.to_string(),
                })
        })
        .transpose()?;

    Ok(Some((role, importance, text.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_roles_and_continuations() {
        let turns = parse(
            "# demo\n\
             system: be brief\n\
             \n\
             user: first line\n\
             \x20 second line\n\
             assistant: ok\n",
        )
        .unwrap();

        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[1].text, "first line\nsecond line");
        assert_eq!(turns[2].role, Role::Assistant);
    }

    #[test]
    fn importance_suffix() {
        let turns = parse("user(4.5): keep this\nassistant: fine").unwrap();
        assert_eq!(turns[0].importance, Some(4.5));
        assert_eq!(turns[1].importance, None);
    }

    #[test]
    fn unknown_prefix_is_continuation() {
        let turns = parse("user: the time is\nnote: 10:42").unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].text, "the time is\nnote: 10:42");
    }

    #[test]
    fn text_before_first_role_is_rejected() {
        let err = parse("hello\nuser: hi").unwrap_err();
        assert!(matches!(err, TranscriptError::Orphan { line: 1 }));
    }

    #[test]
    fn bad_importance_is_rejected() {
        let err = parse("user(high): hi").unwrap_err();
        assert!(matches!(err, TranscriptError::Importance { line: 1, .. }));
        assert!(parse("user(NaN): hi").is_err());
    }

    #[tokio::test]
    async fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.txt");
        std::fs::write(&path, "user: hi\nassistant: hello").unwrap();
        assert_eq!(load(&path).await.unwrap().len(), 2);
    }
}
