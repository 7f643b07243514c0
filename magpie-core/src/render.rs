//! Graphviz DOT export, optionally annotated with session results.

use crate::model::Model;
use crate::results::{ResultClass, SessionSummary, VisitsAndResults};
use std::fmt::Write;

/// Palette used for the coverage annotation.
pub struct Color;

impl Color {
    pub const GREEN: &'static str = "#97CE68";
    pub const GREY: &'static str = "#CCCCCC";
    pub const RED: &'static str = "#C82647";
    pub const ORANGE: &'static str = "#EB9532";
    pub const WHITE: &'static str = "#FFFFFF";
    pub const DARK: &'static str = "#333333";
    pub const MEDIUM_DARK: &'static str = "#BBBBBB";
    pub const LIGHT: &'static str = "#E7E7E7";
}

const NEWLINE: &str = "&#10;";

/// Color for an entity's results. Unvisited entities are neutral.
pub fn result_color(result: Option<&VisitsAndResults>) -> &'static str {
    match result.map(VisitsAndResults::classification) {
        Some(ResultClass::Flaky) => Color::ORANGE,
        Some(ResultClass::Failed) => Color::RED,
        Some(ResultClass::Passed) => Color::GREEN,
        Some(ResultClass::NoResult) | None => Color::MEDIUM_DARK,
    }
}

/// Tooltip text describing an entity's results.
pub fn result_text_summary(result: Option<&VisitsAndResults>) -> String {
    let Some(result) = result else {
        return String::new();
    };
    match result.classification() {
        ResultClass::Flaky => format!(
            "FLAKY{nl}Passed count: {}{nl}Failed count: {}",
            result.pass_count(),
            result.fail_count(),
            nl = NEWLINE
        ),
        ResultClass::Failed => format!("FAILED{}Visit count: {}", NEWLINE, result.fail_count()),
        ResultClass::Passed if result.pass_count() > 0 => {
            format!("PASSED{}Visit count: {}", NEWLINE, result.pass_count())
        }
        ResultClass::Passed => format!("Visit count: {}", result.visits()),
        ResultClass::NoResult => String::new(),
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

fn with_summary(tooltip: &mut String, summary: &str) {
    if !summary.is_empty() {
        tooltip.push_str(NEWLINE);
        tooltip.push_str(NEWLINE);
        tooltip.push_str(summary);
    }
}

impl Model {
    /// Renders the model as DOT. With a summary, colors follow each
    /// entity's result classification and visited edges are drawn thicker.
    pub fn to_dot(&self, summary: Option<&SessionSummary>) -> String {
        let mut dot = String::new();
        let results = summary.map(|s| &s.results);

        dot.push_str("digraph {\n");
        let _ = writeln!(dot, "  label=\"{nl}{nl}{}\";", escape(&self.name), nl = NEWLINE);
        let _ = writeln!(dot, "  bgcolor=\"{}\";", Color::LIGHT);

        let _ = writeln!(
            dot,
            "  \".\" [label=\"\" shape=circle style=filled color=\"{}\" fillcolor=\"{}\" height=0.2 width=0.2];",
            Color::MEDIUM_DARK,
            Color::GREY
        );

        // States, sorted by name
        for name in self.states().keys() {
            let mut fill = Color::WHITE;
            let mut tooltip = name.clone();
            if let Some(results) = results {
                let state_result = results.states.get(name);
                if state_result.is_some() {
                    fill = result_color(state_result);
                }
                with_summary(&mut tooltip, &result_text_summary(state_result));
            }
            let font = if fill == Color::RED {
                Color::LIGHT
            } else {
                Color::DARK
            };
            let _ = writeln!(
                dot,
                "  \"{n}\" [label=\"{n}\" shape=box style=\"rounded,filled\" color=\"{}\" fillcolor=\"{}\" fontcolor=\"{}\" fontsize=12 fontname=Helvetica tooltip=\"{}\"];",
                Color::MEDIUM_DARK,
                fill,
                font,
                escape(&tooltip),
                n = escape(name)
            );
        }

        if let Some(initial) = self.initial_state_name() {
            let visited = results
                .map(|r| r.states.contains_key(initial))
                .unwrap_or(false);
            let (pen, color) = if visited {
                ("2", Color::GREEN)
            } else {
                ("0.75", Color::MEDIUM_DARK)
            };
            let _ = writeln!(
                dot,
                "  \".\" -> \"{}\" [penwidth={} color=\"{}\" style=solid];",
                escape(initial),
                pen,
                color
            );
        }

        for transition in self.transitions() {
            let mut tooltip = format!(
                "Start state: {}{}End state: {}",
                transition.start, NEWLINE, transition.end
            );
            let mut attrs = Vec::new();

            if let Some(action) = &transition.action {
                let _ = write!(tooltip, "{}Action: {}", NEWLINE, action);
                attrs.push(format!("label=\"{}\"", escape(action)));
            }
            let style = if let Some(condition) = &transition.condition {
                let _ = write!(tooltip, "{}Condition: {}", NEWLINE, condition);
                "dashed"
            } else {
                "solid"
            };

            let mut pen = "0.75";
            let mut color = Color::MEDIUM_DARK;
            if let Some(results) = results {
                let transition_result = results.transitions.get(&transition.name());
                if transition_result.is_some() {
                    pen = "2";
                }
                color = result_color(transition_result);
                with_summary(&mut tooltip, &result_text_summary(transition_result));
            }

            attrs.push(format!("penwidth={}", pen));
            attrs.push(format!("color=\"{}\"", color));
            attrs.push("fontsize=8".to_string());
            attrs.push("fontname=\"Times New Roman\"".to_string());
            attrs.push(format!("style={}", style));
            attrs.push(format!("tooltip=\"{}\"", escape(&tooltip)));

            let _ = writeln!(
                dot,
                "  \"{}\" -> \"{}\" [{}];",
                escape(&transition.start),
                escape(&transition.end),
                attrs.join(" ")
            );
        }

        dot.push_str("}\n");
        dot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Transition;
    use crate::results::Outcome;
    use std::sync::Arc;

    fn results_with(outcomes: &[Outcome]) -> VisitsAndResults {
        let mut r = VisitsAndResults::new();
        for o in outcomes {
            r.record_visit(Some(*o));
        }
        r
    }

    fn model() -> Model {
        let mut model = Model::new("login");
        model.add_transition(Transition::new("Start", "Login")).unwrap();
        model
            .add_transition(
                Transition::new("Login", "Home")
                    .with_condition("has account")
                    .with_action("submit"),
            )
            .unwrap();
        model.link();
        model
    }

    #[test]
    fn test_result_colors() {
        use Outcome::*;

        assert_eq!(result_color(Some(&results_with(&[Passed]))), Color::GREEN);
        assert_eq!(result_color(Some(&results_with(&[NotApplicable]))), Color::GREEN);
        assert_eq!(
            result_color(Some(&results_with(&[NotApplicable, Passed]))),
            Color::GREEN
        );
        assert_eq!(result_color(Some(&results_with(&[Failed]))), Color::RED);
        assert_eq!(
            result_color(Some(&results_with(&[NotApplicable, Failed]))),
            Color::RED
        );
        assert_eq!(
            result_color(Some(&results_with(&[NotApplicable, Passed, Failed]))),
            Color::ORANGE
        );
        assert_eq!(result_color(Some(&results_with(&[]))), Color::MEDIUM_DARK);
        assert_eq!(result_color(None), Color::MEDIUM_DARK);
    }

    #[test]
    fn test_result_text_summary() {
        use Outcome::*;

        assert_eq!(
            result_text_summary(Some(&results_with(&[Passed, Failed]))),
            "FLAKY&#10;Passed count: 1&#10;Failed count: 1"
        );
        assert_eq!(
            result_text_summary(Some(&results_with(&[Failed, Failed]))),
            "FAILED&#10;Visit count: 2"
        );
        assert_eq!(
            result_text_summary(Some(&results_with(&[NotApplicable, NotApplicable]))),
            "Visit count: 2"
        );
        assert_eq!(result_text_summary(None), "");
    }

    #[test]
    fn test_plain_dot() {
        let dot = model().to_dot(None);

        assert!(dot.starts_with("digraph {\n"));
        assert!(dot.contains("\".\" -> \"Start\""));
        assert!(dot.contains("\"Home\" [label=\"Home\" shape=box"));
        assert!(dot.contains("\"Login\" -> \"Home\" [label=\"submit\""));
        assert!(dot.contains("style=dashed"));
        assert!(!dot.contains(Color::GREEN));
        assert!(dot.ends_with("}\n"));

        // States sorted by name
        let home = dot.find("\"Home\" [").unwrap();
        let start = dot.find("\"Start\" [").unwrap();
        assert!(home < start);
    }

    #[test]
    fn test_annotated_dot() {
        let model = Arc::new(model());
        let mut summary = SessionSummary::new(model.clone());
        summary.results.record_state("Start", Some(Outcome::Passed));
        summary
            .results
            .record_transition("Start:None:None:Login", Some(Outcome::NotApplicable));
        summary.results.record_state("Login", Some(Outcome::Failed));

        let dot = model.to_dot(Some(&summary));

        assert!(dot.contains(&format!("\".\" -> \"Start\" [penwidth=2 color=\"{}\"", Color::GREEN)));
        assert!(dot.contains(&format!(
            "\"Start\" -> \"Login\" [penwidth=2 color=\"{}\"",
            Color::GREEN
        )));
        assert!(dot.contains(&format!(
            "\"Login\" -> \"Home\" [label=\"submit\" penwidth=0.75 color=\"{}\"",
            Color::MEDIUM_DARK
        )));
        assert!(dot.contains(&format!(
            "fillcolor=\"{}\" fontcolor=\"{}\"",
            Color::RED,
            Color::LIGHT
        )));
    }
}
