use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use nodeflow_core::types::LlmRequest;

use super::condition::{check, Verdict};
use super::{ExecEnv, NodeExecutor, NodeOutcome, RouterVariant};
use crate::context::{NodeContext, NodeOutput};
use crate::graph::Node;

pub struct RouterExecutor(pub RouterVariant);

/// One routing rule.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    #[serde(default, alias = "expression")]
    pub condition: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub priority: Option<f64>,
}

impl Rule {
    fn text(&self) -> &str {
        self.condition.as_deref().unwrap_or_default().trim()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Sequential,
    Priority,
    Llm,
}

impl Strategy {
    fn from_node(node: &Node) -> Self {
        match node.field_str("strategy").map(|s| s.to_lowercase()).as_deref() {
            Some("priority") => Self::Priority,
            Some("llm") => Self::Llm,
            _ => Self::Sequential,
        }
    }
}

/// Parse `rules`; malformed entries are dropped and reported.
pub fn parse_rules(node: &Node) -> (Vec<Rule>, Vec<String>) {
    let mut rules = Vec::new();
    let mut problems = Vec::new();
    if let Some(Value::Array(items)) = node.field("rules") {
        for (i, item) in items.iter().enumerate() {
            match serde_json::from_value::<Rule>(item.clone()) {
                Ok(rule) if !rule.text().is_empty() => rules.push(rule),
                Ok(_) => problems.push(format!("rule[{}] has no condition", i)),
                Err(e) => problems.push(format!("rule[{}] ignored: {}", i, e)),
            }
        }
    }
    (rules, problems)
}

/// Stable sort by priority, highest first. Unset priority sorts as 0.
pub fn by_priority(rules: &mut [(usize, Rule)]) {
    rules.sort_by(|a, b| {
        let pa = a.1.priority.unwrap_or(0.0);
        let pb = b.1.priority.unwrap_or(0.0);
        pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// First integer in an LLM reply, as a 1-based rule number.
fn parse_choice(text: &str, count: usize) -> Option<usize> {
    let digits: String = text
        .trim()
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let n: usize = digits.parse().ok()?;
    (1..=count).contains(&n).then(|| n - 1)
}

fn routed(path: String, summary: String, detail: Value) -> NodeOutcome {
    let mut body = json!({ "output": path, "path": path });
    if let (Some(obj), Value::Object(extra)) = (body.as_object_mut(), detail) {
        obj.extend(extra);
    }
    let mut outcome = NodeOutcome::new(NodeOutput::Structured(body), summary);
    outcome.route = Some(path);
    outcome
}

impl RouterExecutor {
    async fn if_else(&self, node: &Node, ctx: &NodeContext, env: &ExecEnv) -> NodeOutcome {
        let condition = node.field_str("condition").unwrap_or_default();
        let verdict = check(&condition, node, &ctx.variables(), env).await;
        let passed = verdict.passed();
        let path = if passed {
            node.field_str("truePath").unwrap_or_else(|| "true".into())
        } else {
            node.field_str("falsePath").unwrap_or_else(|| "false".into())
        };
        let how = match verdict {
            Verdict::Expression(_) => "expression",
            Verdict::Llm(_) => "llm",
        };
        routed(
            path.clone(),
            format!("Condition evaluated {} by {}; routing to '{}'", passed, how, path),
            json!({ "matched": passed }),
        )
        .rule(format!("condition -> {}", passed))
        .trace(format!("condition: {}", condition))
        .simulated(how == "llm" && env.is_mock())
    }

    async fn rules(&self, node: &Node, ctx: &NodeContext, env: &ExecEnv) -> NodeOutcome {
        let strategy = Strategy::from_node(node);
        let (rules, problems) = parse_rules(node);
        let default_path = node.field_str("defaultPath");
        let mut trace: Vec<String> = problems;
        trace.push(format!("strategy: {:?}", strategy));

        let chosen: Option<(usize, Rule)> = match strategy {
            Strategy::Llm => self.llm_pick(node, ctx, env, &rules, &mut trace).await,
            Strategy::Sequential | Strategy::Priority => {
                let mut ordered: Vec<(usize, Rule)> = rules.into_iter().enumerate().collect();
                if strategy == Strategy::Priority {
                    by_priority(&mut ordered);
                }
                let vars = ctx.variables();
                let mut hit = None;
                for (i, rule) in ordered {
                    let verdict = check(rule.text(), node, &vars, env).await;
                    trace.push(format!("rule[{}] {:?}", i, verdict));
                    if verdict.passed() {
                        hit = Some((i, rule));
                        break;
                    }
                }
                hit
            }
        };

        let mut outcome = match chosen {
            Some((i, rule)) => {
                let path = rule.path.clone().unwrap_or_else(|| format!("rule-{}", i));
                routed(
                    path.clone(),
                    format!("Rule {} matched; routing to '{}'", i, path),
                    json!({ "rule": i }),
                )
                .rule(format!("rule[{}]: {} -> {}", i, rule.text(), path))
            }
            None => match default_path {
                Some(path) => routed(
                    path.clone(),
                    format!("No rule matched; taking default path '{}'", path),
                    json!({ "default": true }),
                )
                .rule("defaultPath"),
                None => NodeOutcome::new(
                    NodeOutput::Structured(json!({ "output": "No rule matched and no default path", "path": Value::Null })),
                    "No rule matched and no default path is set",
                ),
            },
        };
        outcome.trace.extend(trace);
        outcome.simulated(strategy == Strategy::Llm && env.is_mock())
    }

    async fn llm_pick(
        &self,
        node: &Node,
        ctx: &NodeContext,
        env: &ExecEnv,
        rules: &[Rule],
        trace: &mut Vec<String>,
    ) -> Option<(usize, Rule)> {
        if rules.is_empty() {
            return None;
        }
        let listing = rules
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}", i + 1, r.text()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Rules:\n{}\n\nInput:\n{}\n\nReply with the number of the first rule the input satisfies, or 0 if none.",
            listing,
            ctx.input_text()
        );
        match env.ask(node, LlmRequest::new(prompt)).await {
            Ok(resp) => {
                let pick = parse_choice(&resp.text, rules.len());
                trace.push(format!("llm picked {:?} from '{}'", pick, resp.text.trim()));
                pick.map(|i| (i, rules[i].clone()))
            }
            Err(e) => {
                warn!(node_id = %node.id, error = %e, "Router LLM selection failed");
                trace.push(format!("llm selection failed: {}", e));
                None
            }
        }
    }
}

impl NodeExecutor for RouterExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a Node,
        ctx: &'a NodeContext,
        env: &'a ExecEnv,
    ) -> BoxFuture<'a, NodeOutcome> {
        Box::pin(async move {
            debug!(node_id = %node.id, variant = ?self.0, "Routing");
            match self.0 {
                RouterVariant::IfElse => self.if_else(node, ctx, env).await,
                RouterVariant::Router | RouterVariant::DecisionTree => {
                    self.rules(node, ctx, env).await
                }
            }
        })
    }
}
