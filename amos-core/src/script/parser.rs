use std::sync::LazyLock;

use chumsky::prelude::*;
use regex::Regex;

use super::{ScriptError, ScriptStatus};

/// `[string_id,component]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringRef {
    pub string_id: String,
    pub component: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// `CPY`: copy unless the destination already exists.
    Copy { from: StringRef, to: StringRef },
    /// `FCP`: copy even over an existing destination.
    ForcedCopy { from: StringRef, to: StringRef },
    /// `MOV`: copy, then delete the source.
    Move { from: StringRef, to: StringRef },
    /// `HLP`: migrate a per-language help file into a string.
    HelpMigration { path: String, to: StringRef },
    /// `REM`: ignored.
    Remark(String),
}

// 标识符中不允许出现的字符
const IDENT_ILLEGAL_CHARS: &str = ",[] \t\r\n";

fn ident_parser<'src>() -> impl Parser<'src, &'src str, String, extra::Err<Rich<'src, char>>> + Clone {
    none_of(IDENT_ILLEGAL_CHARS)
        .repeated()
        .at_least(1)
        .to_slice()
        .map(|s: &str| s.to_string())
        .labelled("identifier")
}

fn string_ref_parser<'src>()
-> impl Parser<'src, &'src str, StringRef, extra::Err<Rich<'src, char>>> + Clone {
    ident_parser()
        .padded()
        .then_ignore(just(','))
        .then(ident_parser().padded())
        .delimited_by(just('['), just(']'))
        .map(|(string_id, component)| StringRef {
            string_id,
            component,
        })
        .labelled("[stringid,component]")
}

fn ref_pair_parser<'src>()
-> impl Parser<'src, &'src str, (StringRef, StringRef), extra::Err<Rich<'src, char>>> {
    string_ref_parser()
        .padded()
        .then_ignore(just(','))
        .then(string_ref_parser().padded())
        .then_ignore(end())
}

fn help_parser<'src>() -> impl Parser<'src, &'src str, (String, StringRef), extra::Err<Rich<'src, char>>> {
    ident_parser()
        .padded()
        .then_ignore(just(','))
        .then(string_ref_parser().padded())
        .then_ignore(end())
}

fn syntax_error<'src>(line: &str, errors: Vec<Rich<'src, char>>) -> ScriptError {
    let detail = errors
        .into_iter()
        .next()
        .map(|e| e.to_string())
        .unwrap_or_else(|| "malformed arguments".to_string());
    ScriptError::new(ScriptStatus::SyntaxError, line, detail)
}

/// Parse one instruction line.
pub fn parse_instruction(line: &str) -> Result<Instruction, ScriptError> {
    let line = line.trim();
    let (keyword, args) = line
        .split_once(char::is_whitespace)
        .unwrap_or((line, ""));

    let pair = |args: &str| {
        ref_pair_parser()
            .parse(args)
            .into_result()
            .map_err(|errors| syntax_error(line, errors))
    };

    match keyword {
        "CPY" => pair(args).map(|(from, to)| Instruction::Copy { from, to }),
        "FCP" => pair(args).map(|(from, to)| Instruction::ForcedCopy { from, to }),
        "MOV" => pair(args).map(|(from, to)| Instruction::Move { from, to }),
        "HLP" => help_parser()
            .parse(args)
            .into_result()
            .map(|(path, to)| Instruction::HelpMigration { path, to })
            .map_err(|errors| syntax_error(line, errors)),
        "REM" => Ok(Instruction::Remark(args.trim().to_string())),
        _ => Err(ScriptError::new(
            ScriptStatus::UnknownInstruction,
            line,
            format!("unknown keyword '{keyword}'"),
        )),
    }
}

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\bAMOS\s+(?:BEGIN|START)\b(.*?)\bAMOS\s+END\b").expect("valid regex")
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:CPY|FCP|MOV|HLP|REM)\b").expect("valid regex"));

/// Instructions of the first `AMOS BEGIN` … `AMOS END` block in `text`,
/// one per element. Line breaks inside the block are not significant.
pub fn extract_script_from_text(text: &str) -> Vec<String> {
    let Some(block) = SCRIPT_BLOCK.captures(text).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    let script = WHITESPACE.replace_all(block.as_str(), " ");
    let script = script.trim();

    let mut starts: Vec<usize> = KEYWORD.find_iter(script).map(|m| m.start()).collect();
    if starts.first() != Some(&0) {
        // 第一个关键字之前的内容单独成行，执行时会报告为未知指令
        starts.insert(0, 0);
    }
    starts
        .iter()
        .enumerate()
        .map(|(i, start)| {
            let end = starts.get(i + 1).copied().unwrap_or(script.len());
            script[*start..end].trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sref(string_id: &str, component: &str) -> StringRef {
        StringRef {
            string_id: string_id.to_string(),
            component: component.to_string(),
        }
    }

    #[test]
    fn parses_copy_family() {
        assert_eq!(
            parse_instruction("CPY [foo,mod_a],[bar,mod_a]").unwrap(),
            Instruction::Copy {
                from: sref("foo", "mod_a"),
                to: sref("bar", "mod_a"),
            }
        );
        assert_eq!(
            parse_instruction("  FCP [ foo , core ] , [bar,core_admin]  ").unwrap(),
            Instruction::ForcedCopy {
                from: sref("foo", "core"),
                to: sref("bar", "core_admin"),
            }
        );
        assert!(matches!(
            parse_instruction("MOV [a,mod_x],[b,mod_x]").unwrap(),
            Instruction::Move { .. }
        ));
    }

    #[test]
    fn parses_help_and_remark() {
        assert_eq!(
            parse_instruction("HLP forum/subscription.html,[subscription_help,mod_forum]").unwrap(),
            Instruction::HelpMigration {
                path: "forum/subscription.html".to_string(),
                to: sref("subscription_help", "mod_forum"),
            }
        );
        assert_eq!(
            parse_instruction("REM notify translators").unwrap(),
            Instruction::Remark("notify translators".to_string())
        );
    }

    #[test]
    fn reports_status_codes() {
        let unknown = parse_instruction("DEL [a,core]").unwrap_err();
        assert_eq!(unknown.status, ScriptStatus::UnknownInstruction);
        assert_eq!(unknown.status.code(), -2);

        for bad in ["CPY [a,core]", "CPY [a,core],[b]", "MOV a,core,b,core", "CPY [a,core],[b,core] x", "HLP [a,core]"] {
            let err = parse_instruction(bad).unwrap_err();
            assert_eq!(err.status, ScriptStatus::SyntaxError, "{bad}");
            assert_eq!(err.status.code(), -1);
        }
    }

    #[test]
    fn extracts_multi_and_single_line_scripts() {
        let message = "MDL-1234 forum: rename strings\n\nAMOS BEGIN\n CPY [a,mod_forum],[b,mod_forum]\n\n  MOV [c,mod_forum],\n[d,mod_forum]\nAMOS END\ntrailing text";
        assert_eq!(
            extract_script_from_text(message),
            vec![
                "CPY [a,mod_forum],[b,mod_forum]".to_string(),
                "MOV [c,mod_forum], [d,mod_forum]".to_string(),
            ]
        );

        let single = "AMOS START CPY [a,core],[b,core] FCP [x,core],[y,core] AMOS END";
        assert_eq!(extract_script_from_text(single).len(), 2);

        assert!(extract_script_from_text("no script here").is_empty());
        assert!(extract_script_from_text("amos begin CPY [a,b],[c,d] amos end").is_empty());
    }
}
