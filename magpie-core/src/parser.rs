//! Model DSL parser.
//!
//! One statement per line, tokens separated by two or more spaces:
//!
//! ```text
//! # comment
//! Start                               =>  Home
//! Home            'open settings'     ->  Settings
//! Settings  [is logged in]  'log out' =>  Home
//! ```
//!
//! Parsing runs in two phases. The first tokenizes and validates every line
//! on its own. The second builds the model, rejects duplicate transitions and
//! checks reachability. Diagnostics from both phases are aggregated and
//! reported together, sorted by line.

use crate::error::{CoreError, Diagnostic, Diagnostics};
use crate::model::{Arrow, Model, Transition};
use std::path::Path;

/// Tabs expand to this many spaces.
const TAB_WIDTH: usize = 4;

/// The parts of one model line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowParts {
    pub start_state: String,
    pub condition: Option<String>,
    pub action: Option<String>,
    pub arrow: Option<Arrow>,
    pub end_state: String,
}

/// Parses model text into a validated [`Model`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Reads and parses a model file.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Model, CoreError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| CoreError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.parse_str(&source, &path.display().to_string())
    }

    /// Parses model text. `path` is used for diagnostics and the model name.
    pub fn parse_str(&self, source: &str, path: &str) -> Result<Model, CoreError> {
        let mut diagnostics = Vec::new();
        let mut rows: Vec<(usize, RowParts)> = Vec::new();

        for (idx, raw) in source.lines().enumerate() {
            let line_no = idx + 1;
            match parse_row(raw) {
                Ok(Some(row)) => rows.push((line_no, row)),
                Ok(None) => {}
                Err(messages) => {
                    diagnostics.extend(messages.into_iter().map(|m| Diagnostic::syntax(line_no, m)));
                }
            }
        }

        let name = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string());
        let mut model = Model::new(name);

        // Pass (a): register every distinct name
        for (_, row) in &rows {
            if let Some(action) = &row.action {
                model.add_action(action);
            }
            if let Some(condition) = &row.condition {
                model.add_condition(condition);
            }
            model.add_state(&row.start_state);
            model.add_state(&row.end_state);
        }

        // Pass (b): build transitions
        for (line_no, row) in rows {
            let mut transition = Transition::new(&row.start_state, &row.end_state)
                .with_happy_path(row.arrow == Some(Arrow::HappyPath))
                .with_source(path, line_no);
            transition.action = row.action.clone();
            transition.condition = row.condition.clone();

            if model.add_transition(transition).is_err() {
                diagnostics.push(Diagnostic::semantic(
                    line_no,
                    duplicate_message(&row),
                ));
            }
        }

        model.link();

        for transition in model.transitions() {
            if model.state_is_unreachable(&transition.start) {
                diagnostics.push(Diagnostic::semantic(
                    transition.source.line,
                    format!(
                        "Unreachable state: `{}`! Please check your spelling. If correct, \
                         you need to add a transition pointing to this state.",
                        transition.start
                    ),
                ));
            }
        }

        if !diagnostics.is_empty() {
            let report = Diagnostics::new(path, diagnostics);
            tracing::debug!("model '{}' rejected with {} diagnostic(s)", path, report.len());
            return Err(CoreError::InvalidModel(report));
        }

        tracing::debug!(
            "parsed model '{}': {} states, {} transitions",
            model.name,
            model.states().len(),
            model.transitions().len()
        );
        Ok(model)
    }
}

/// Parses a single line.
///
/// Returns `Ok(None)` for blank and comment lines, and the list of problems
/// if the line is malformed.
pub fn parse_row(raw: &str) -> Result<Option<RowParts>, Vec<String>> {
    let expanded = raw.replace('\t', &" ".repeat(TAB_WIDTH));
    let line = expanded.trim_matches(' ');
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let tokens = split_tokens(line);
    let count = tokens.len();

    if count < 3 {
        return Err(vec![
            "Too few items, review your syntax and add the missing parts.".to_string(),
        ]);
    }
    if count > 5 {
        return Err(vec![
            "Too many items, review your syntax and delete the superfluous parts.".to_string(),
        ]);
    }

    let shape_ok = match count {
        3 => is_stringlike(tokens[0]) && is_arrow(tokens[1]) && is_stringlike(tokens[2]),
        4 => {
            is_stringlike(tokens[0])
                && is_stringlike(tokens[1])
                && is_arrow(tokens[2])
                && is_stringlike(tokens[3])
        }
        _ => {
            is_stringlike(tokens[0])
                && is_condition(tokens[1])
                && is_stringlike(tokens[2])
                && is_arrow(tokens[3])
                && is_stringlike(tokens[4])
        }
    };

    if !shape_ok {
        return Err(shape_errors(&tokens));
    }

    let row = match count {
        3 => RowParts {
            start_state: strip_quotes(tokens[0]).to_string(),
            arrow: Arrow::from_token(tokens[1]),
            end_state: strip_quotes(tokens[2]).to_string(),
            ..RowParts::default()
        },
        4 => RowParts {
            start_state: strip_quotes(tokens[0]).to_string(),
            action: Some(strip_quotes(tokens[1]).to_string()),
            arrow: Arrow::from_token(tokens[2]),
            end_state: strip_quotes(tokens[3]).to_string(),
            ..RowParts::default()
        },
        _ => {
            let inner = strip_quotes(tokens[1].trim_start_matches('[').trim_end_matches(']').trim());
            RowParts {
                start_state: strip_quotes(tokens[0]).to_string(),
                // `[]` leaves the transition unguarded
                condition: (!inner.is_empty()).then(|| inner.to_string()),
                action: Some(strip_quotes(tokens[2]).to_string()),
                arrow: Arrow::from_token(tokens[3]),
                end_state: strip_quotes(tokens[4]).to_string(),
            }
        }
    };

    Ok(Some(row))
}

/// Explains why a line with a valid token count has the wrong shape.
fn shape_errors(tokens: &[&str]) -> Vec<String> {
    let mut errors = Vec::new();

    let arrows = tokens.iter().filter(|t| is_arrow(t)).count();
    if arrows == 0 {
        let allowed: Vec<&str> = Arrow::ALL.iter().map(|a| a.as_str()).collect();
        errors.push(format!(
            "There has to be an arrow on each line. Please add one of these: {}",
            allowed.join(" or ")
        ));
    } else if arrows > 1 {
        let extra = arrows - 1;
        errors.push(format!(
            "There has to be exactly one arrow on each line. Please remove {} arrow{}.",
            extra,
            if extra == 1 { "" } else { "s" }
        ));
    }

    let conditions = tokens.iter().filter(|t| is_condition(t)).count();
    if conditions > 1 {
        errors.push(format!(
            "There can't be more than one conditional on each line. \
             This line has {} conditionals.",
            friendly_number(conditions)
        ));
    }

    if errors.is_empty() {
        errors.push(
            "Invalid syntax, expected `State  [condition]  'action'  =>  State` \
             where the condition and the action are optional. \
             Names can't contain double quotes."
                .to_string(),
        );
    }

    errors
}

fn duplicate_message(row: &RowParts) -> String {
    let mut qualifier = Vec::new();
    if let Some(condition) = &row.condition {
        qualifier.push(format!("condition `{}`", condition));
    }
    if let Some(action) = &row.action {
        qualifier.push(format!("action `{}`", action));
    }
    let qualifier = if qualifier.is_empty() {
        String::new()
    } else {
        format!(" with {}", qualifier.join(" and "))
    };
    format!(
        "Duplicate transition, only one transition between `{}` and `{}`{} is allowed. \
         Remove the superfluous one(s).",
        row.start_state, row.end_state, qualifier
    )
}

/// Splits on runs of two or more spaces.
fn split_tokens(line: &str) -> Vec<&str> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b' ' && bytes.get(i + 1) == Some(&b' ') {
            tokens.push(&line[start..i]);
            while i < bytes.len() && bytes[i] == b' ' {
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }
    tokens.push(&line[start..]);
    tokens
}

fn is_arrow(token: &str) -> bool {
    Arrow::from_token(token).is_some()
}

fn is_condition(token: &str) -> bool {
    token.len() >= 2
        && token.starts_with('[')
        && token.ends_with(']')
        && !token.contains('\'')
        && !token.contains('"')
}

fn is_stringlike(token: &str) -> bool {
    !token.is_empty() && !is_arrow(token) && !token.trim_matches('"').contains('"')
}

fn strip_quotes(token: &str) -> &str {
    token.trim_matches('"').trim_matches('\'')
}

fn friendly_number(num: usize) -> String {
    const WORDS: [&str; 20] = [
        "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
        "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen",
        "eighteen", "nineteen",
    ];
    WORDS
        .get(num)
        .map(|w| w.to_string())
        .unwrap_or_else(|| num.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PATH: &str = "using/template/instead";

    fn parse(template: &str) -> Result<Model, CoreError> {
        Parser::new().parse_str(template, PATH)
    }

    fn error_text(template: &str) -> String {
        parse(template).unwrap_err().to_string()
    }

    #[test]
    fn test_row_parser_shapes() {
        let row = parse_row("A  =>  B").unwrap().unwrap();
        assert_eq!(row.start_state, "A");
        assert_eq!(row.arrow, Some(Arrow::HappyPath));
        assert_eq!(row.end_state, "B");
        assert!(row.action.is_none());

        let row = parse_row("ÅÄÖ  =>  ÖÄÅ").unwrap().unwrap();
        assert_eq!((row.start_state.as_str(), row.end_state.as_str()), ("ÅÄÖ", "ÖÄÅ"));

        let row = parse_row("\"A: X\"  'a'  ->  \"B: Y\"").unwrap().unwrap();
        assert_eq!(row.start_state, "A: X");
        assert_eq!(row.action.as_deref(), Some("a"));
        assert_eq!(row.arrow, Some(Arrow::AlternatePath));
        assert_eq!(row.end_state, "B: Y");

        let row = parse_row("\"A: X\"  [c d]  'a'  ->  \"B: Y\"").unwrap().unwrap();
        assert_eq!(row.condition.as_deref(), Some("c d"));
        assert_eq!(row.action.as_deref(), Some("a"));
    }

    #[test]
    fn test_empty_condition_is_unguarded() {
        let row = parse_row("A  []  'go'  ->  B").unwrap().unwrap();
        assert!(row.condition.is_none());
        assert_eq!(row.action.as_deref(), Some("go"));

        let model = parse("A  [ ]  'go'  ->  B\n").unwrap();
        assert!(model.conditions().is_empty());
        assert!(model.transitions().iter().all(|t| !t.is_guarded()));
    }

    #[test]
    fn test_blank_comment_and_tabs() {
        assert_eq!(parse_row("").unwrap(), None);
        assert_eq!(parse_row("   ").unwrap(), None);
        assert_eq!(parse_row("   # A  =>  B").unwrap(), None);

        let row = parse_row("\tA\t=>\tB").unwrap().unwrap();
        assert_eq!(row.start_state, "A");
        assert_eq!(row.end_state, "B");
    }

    #[test]
    fn test_single_space_stays_in_name() {
        let row = parse_row("First state  'do it'  ->  Second state").unwrap().unwrap();
        assert_eq!(row.start_state, "First state");
        assert_eq!(row.action.as_deref(), Some("do it"));
        assert_eq!(row.end_state, "Second state");
    }

    #[test]
    fn test_multiline_model() {
        let model = parse(
            "
    Start                                         =>  First state
    First state                  'first action'   ->  Second state
    Second state  [condition 1]  'first action'   =>  First state
    Second state  [condition 2]  'do nothing'     ->  Second state
    ",
        )
        .unwrap();

        assert_eq!(model.transitions().len(), 4);
        assert_eq!(model.states().len(), 3);
        assert_eq!(model.initial_state_name(), Some("Start"));

        let t = model.transition_by_name("Start:None:None:First state").unwrap();
        assert!(t.action.is_none());
        assert!(t.happy_path);

        let t = model
            .transition_by_name("First state:None:first action:Second state")
            .unwrap();
        assert!(!t.happy_path);
        assert_eq!(model.action("first action").unwrap().hook_key(), "first_action");

        let t = model
            .transition_by_name("Second state:condition 1:first action:First state")
            .unwrap();
        assert!(t.happy_path);
        assert_eq!(model.condition("condition 1").unwrap().hook_key(), "condition_1");

        let inbound_names: Vec<String> = model.inbounds("First state").map(|t| t.name()).collect();
        assert_eq!(
            inbound_names,
            vec![
                "Start:None:None:First state",
                "Second state:condition 1:first action:First state"
            ]
        );
        assert_eq!(model.inbounds("Start").count(), 0);

        let outbound_names: Vec<String> =
            model.outbounds("Second state").map(|t| t.name()).collect();
        assert_eq!(
            outbound_names,
            vec![
                "Second state:condition 1:first action:First state",
                "Second state:condition 2:do nothing:Second state"
            ]
        );
    }

    #[test]
    fn test_source_lines_recorded() {
        let model = parse("\n# comment\nA  ->  B\n\nB  ->  C\n").unwrap();
        let lines: Vec<usize> = model.transitions().iter().map(|t| t.source.line).collect();
        assert_eq!(lines, vec![3, 5]);
        assert_eq!(model.transitions()[0].source.file, PATH);
        assert_eq!(model.name, "instead");
    }

    #[test]
    fn test_duplicate_transition_cites_second_line() {
        let err = error_text(
            "Start  =>  First state\nFirst state  'first action'  ->  Second state\nStart  =>  First state\n",
        );
        assert_eq!(
            err,
            "\"using/template/instead\", line 3: Duplicate transition, only one transition \
             between `Start` and `First state` is allowed. Remove the superfluous one(s)."
        );
    }

    #[test]
    fn test_duplicate_with_action_named() {
        let err = error_text("A  'go'  ->  B\nA  'go'  ->  B\n");
        assert!(err.contains("line 2"));
        assert!(err.contains("with action `go`"));
    }

    #[test]
    fn test_unreachable_state() {
        let err = parse("Start  =>  First state\nSecond state  ->  First state\n").unwrap_err();
        assert_eq!(err.error_code(), "MODEL_ERROR");
        assert_eq!(
            err.to_string(),
            "\"using/template/instead\", line 2: Unreachable state: `Second state`! Please \
             check your spelling. If correct, you need to add a transition pointing to this state."
        );
    }

    #[test]
    fn test_too_few_items() {
        for template in ["Start  =>", "=>  End", "=>", "A", "[C]"] {
            assert_eq!(
                error_text(template),
                "\"using/template/instead\", line 1: Too few items, review your syntax \
                 and add the missing parts.",
                "template: {template}"
            );
        }
    }

    #[test]
    fn test_too_many_items() {
        let err = error_text("A  [c]  'a'  =>  B  C");
        assert!(err.ends_with("Too many items, review your syntax and delete the superfluous parts."));
    }

    #[test]
    fn test_arrow_diagnostics() {
        let err = error_text("A  B  C");
        assert!(err.contains("There has to be an arrow on each line. Please add one of these: => or ->"));

        let err = error_text("A  =>  B  ->  C");
        assert!(err.contains("Please remove 1 arrow."));

        let err = error_text("A  =>  ->  =>  C");
        assert!(err.contains("Please remove 2 arrows."));
    }

    #[test]
    fn test_condition_diagnostics() {
        let err = error_text("A  [c1]  ->  [c2]  B");
        assert!(err.contains("This line has two conditionals."));
    }

    #[test]
    fn test_all_diagnostics_aggregated_and_sorted() {
        let err = parse("A  ->  B\nX  Y  Z\nA  ->  B\nfoo\n").unwrap_err();
        let diagnostics = err.diagnostics().unwrap();
        let lines: Vec<usize> = diagnostics.entries().iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![2, 3, 4]);
        assert_eq!(err.error_code(), "PARSING_ERROR");
        assert_eq!(err.to_string().lines().count(), 3);
    }

    #[test]
    fn test_internal_quote_rejected() {
        let err = error_text("A  =>  B\"x\"y");
        assert!(err.contains("line 1: Invalid syntax"));
    }

    #[test]
    fn test_parse_file_missing() {
        let result = Parser::new().parse_file("/definitely/not/here/model");
        assert!(matches!(result, Err(CoreError::Io { .. })));
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("login.model");
        std::fs::write(&path, "Start  =>  Login\nLogin  'submit'  ->  Home\n").unwrap();

        let model = Parser::new().parse_file(&path).unwrap();
        assert_eq!(model.name, "login");
        assert_eq!(model.transitions().len(), 2);
    }

    fn line_strategy() -> impl Strategy<Value = String> {
        let name = prop::sample::select(vec!["A", "B", "C", "D"]);
        let arrow = prop::sample::select(vec!["->", "=>"]);
        let action = prop::option::of(prop::sample::select(vec!["'go'", "'stay'"]));
        (name.clone(), action, arrow, name).prop_map(|(from, action, arrow, to)| match action {
            Some(a) => format!("{from}  {a}  {arrow}  {to}"),
            None => format!("{from}  {arrow}  {to}"),
        })
    }

    proptest! {
        #[test]
        fn prop_parsing_is_idempotent(lines in prop::collection::vec(line_strategy(), 1..12)) {
            let text = lines.join("\n");
            let first = parse(&text);
            let second = parse(&text);

            match (first, second) {
                (Ok(a), Ok(b)) => {
                    let names_a: Vec<&String> = a.states().keys().collect();
                    let names_b: Vec<&String> = b.states().keys().collect();
                    prop_assert_eq!(names_a, names_b);
                    prop_assert_eq!(a.initial_state_name(), b.initial_state_name());
                    prop_assert_eq!(a.checksum(), b.checksum());
                }
                (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
                _ => prop_assert!(false, "parsing the same text gave different outcomes"),
            }
        }
    }
}
