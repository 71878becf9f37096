use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use nodeflow_core::types::LlmRequest;

use super::ExecEnv;
use crate::graph::Node;

/// How a condition was decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Expression(bool),
    Llm(bool),
}

impl Verdict {
    pub fn passed(&self) -> bool {
        match self {
            Self::Expression(b) | Self::Llm(b) => *b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Contains,
}

/// A parsed `key OP value` comparison.
#[derive(Debug, PartialEq)]
struct Comparison<'a> {
    key: &'a str,
    op: Op,
    value: &'a str,
}

impl Comparison<'_> {
    fn holds(&self, vars: &HashMap<String, Value>) -> bool {
        let Some(actual) = vars.get(self.key).and_then(scalar_text) else {
            return false;
        };
        match self.op {
            Op::Eq => actual == self.value,
            Op::Ne => actual != self.value,
            Op::Contains => actual.contains(self.value),
        }
    }
}

/// The key must be a bare identifier directly followed by the operator, so
/// operator words inside the value (`mode == "contains"`) stay part of it.
fn parse_comparison(text: &str) -> Option<Comparison<'_>> {
    let Ok(re) = Regex::new(r#"^\s*([A-Za-z_][\w.\-]*)\s*(==|!=|\bcontains\b)\s*(.*?)\s*$"#) else {
        return None;
    };
    let caps = re.captures(text)?;
    let op = match caps.get(2)?.as_str() {
        "==" => Op::Eq,
        "!=" => Op::Ne,
        _ => Op::Contains,
    };
    let value = unquote(caps.get(3)?.as_str());
    if value.is_empty() {
        return None;
    }
    Some(Comparison {
        key: caps.get(1)?.as_str(),
        op,
        value,
    })
}

/// Drop one pair of matching surrounding quotes.
fn unquote(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    raw
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        _ => None,
    }
}

/// Whether `text` is a `key == value`, `key != value` or `key contains value`
/// comparison rather than prose.
pub fn is_expression(text: &str) -> bool {
    parse_comparison(text).is_some()
}

/// Evaluate a comparison against the variables. Anything that does not
/// parse, and any missing key, is `false`.
pub fn evaluate_condition(expr: &str, vars: &HashMap<String, Value>) -> bool {
    parse_comparison(expr).is_some_and(|c| c.holds(vars))
}

/// Strict reading of a TRUE/FALSE answer: only `TRUE` after trimming passes.
pub fn parse_boolean_answer(text: &str) -> bool {
    text.trim() == "TRUE"
}

/// Decide a condition: expressions locally, prose via one LLM call.
/// A failed call counts as FALSE.
pub async fn check(condition: &str, node: &Node, vars: &HashMap<String, Value>, env: &ExecEnv) -> Verdict {
    if is_expression(condition) {
        return Verdict::Expression(evaluate_condition(condition, vars));
    }

    let input = vars.get("input").and_then(|v| v.as_str()).unwrap_or_default();
    let prompt = format!(
        "Condition: {}\n\nInput:\n{}\n\nDoes the input satisfy the condition? Respond TRUE or FALSE only.",
        condition.trim(),
        input
    );
    match env.ask(node, LlmRequest::new(prompt)).await {
        Ok(resp) => Verdict::Llm(parse_boolean_answer(&resp.text)),
        Err(e) => {
            warn!(node_id = %node.id, error = %e, "Condition evaluation failed, treating as FALSE");
            Verdict::Llm(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn equals_and_not_equals() {
        let v = vars(&[("status", "success")]);
        assert!(evaluate_condition(r#"status == "success""#, &v));
        assert!(!evaluate_condition(r#"status == "failure""#, &v));
        assert!(evaluate_condition(r#"status != "failure""#, &v));
        assert!(!evaluate_condition(r#"status != "success""#, &v));
    }

    #[test]
    fn contains() {
        let v = vars(&[("input", "please book a meeting")]);
        assert!(evaluate_condition(r#"input contains "book""#, &v));
        assert!(!evaluate_condition(r#"input contains "cancel""#, &v));
    }

    #[test]
    fn missing_key_and_garbage_are_false() {
        let v = vars(&[]);
        assert!(!evaluate_condition(r#"missing == "x""#, &v));
        assert!(!evaluate_condition("not an expression", &v));
    }

    #[test]
    fn prose_is_not_an_expression() {
        assert!(is_expression(r#"input contains "refund""#));
        assert!(is_expression(r#"tier == "gold""#));
        assert!(!is_expression("the customer sounds angry"));
        assert!(!is_expression("the message contains a refund request"));
    }

    #[test]
    fn operator_words_inside_values() {
        let v = vars(&[("mode", "contains"), ("note", "a == b"), ("op", "!=")]);
        assert!(evaluate_condition(r#"mode == "contains""#, &v));
        assert!(!evaluate_condition(r#"mode != "contains""#, &v));
        assert!(evaluate_condition(r#"note == "a == b""#, &v));
        assert!(evaluate_condition(r#"note contains "==""#, &v));
        assert!(evaluate_condition(r#"op == "!=""#, &v));
        assert!(evaluate_condition("mode contains 'tain'", &v));
    }

    #[test]
    fn non_string_variables_compare_as_text() {
        let mut v = vars(&[]);
        v.insert("count".into(), serde_json::json!(3));
        v.insert("ok".into(), Value::Bool(true));
        v.insert("list".into(), serde_json::json!(["3"]));
        assert!(evaluate_condition(r#"count == "3""#, &v));
        assert!(evaluate_condition("ok == true", &v));
        assert!(!evaluate_condition(r#"list contains "3""#, &v));
    }

    #[test]
    fn keys_must_be_bare_identifiers() {
        assert!(is_expression(r#"node-1.status == "done""#));
        assert!(!is_expression(r#"== "x""#));
        assert!(!is_expression(r#"status == "#));
        assert!(!is_expression(r#"inputcontains "x""#));
        assert!(!is_expression(r#""status" == "x""#));
    }

    #[test]
    fn boolean_answer_is_exact() {
        assert!(parse_boolean_answer("  TRUE\n"));
        assert!(!parse_boolean_answer("True"));
        assert!(!parse_boolean_answer("TRUE."));
        assert!(!parse_boolean_answer("yes"));
    }

    mod llm {
        use std::sync::Arc;

        use super::super::{check, Verdict};
        use super::vars;
        use crate::graph::Node;

        use nodeflow_test_utils::{FailingLlm, ScriptedLlm};

        use crate::executors::testing::live_env;

        async fn ask(reply: &str) -> (Verdict, Arc<ScriptedLlm>) {
            let llm = Arc::new(ScriptedLlm::always(reply));
            let env = live_env(llm.clone());
            let node = Node::new("c", "router");
            let v = vars(&[("input", "I want my money back")]);
            (check("the user asks for a refund", &node, &v, &env).await, llm)
        }

        #[tokio::test]
        async fn only_exact_true_passes() {
            let (verdict, llm) = ask(" TRUE \n").await;
            assert_eq!(verdict, Verdict::Llm(true));
            let prompt = &llm.requests()[0].prompt;
            assert!(prompt.starts_with("Condition: the user asks for a refund"));
            assert!(prompt.contains("I want my money back"));
            assert!(prompt.ends_with("Respond TRUE or FALSE only."));

            for reply in ["True", "true", "TRUE.", "Yes, TRUE", "FALSE"] {
                assert_eq!(ask(reply).await.0, Verdict::Llm(false), "reply {:?}", reply);
            }
        }

        #[tokio::test]
        async fn failed_call_is_false() {
            let env = live_env(Arc::new(FailingLlm));
            let node = Node::new("c", "router");
            let verdict = check("the user asks for a refund", &node, &vars(&[]), &env).await;
            assert_eq!(verdict, Verdict::Llm(false));
        }

        #[tokio::test]
        async fn expressions_never_reach_the_llm() {
            let llm = Arc::new(ScriptedLlm::always("TRUE"));
            let env = live_env(llm.clone());
            let node = Node::new("c", "router");
            let v = vars(&[("mode", "contains")]);
            assert_eq!(
                check(r#"mode == "contains""#, &node, &v, &env).await,
                Verdict::Expression(true)
            );
            assert_eq!(llm.calls(), 0);
        }
    }
}

