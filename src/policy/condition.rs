//! Trust expression synthesis.
//!
//! This module compiles trust-policy intent into a single CEL boolean
//! expression evaluated by the cloud provider at token-exchange time. The
//! expression is a conjunction of clauses in a fixed order, with the
//! repository clause always present and always first. Every multi-term
//! clause is individually parenthesized so operator precedence cannot be
//! altered by future clause additions.

use crate::config::TrustPolicy;

/// Builds the trust expression for a validated policy.
///
/// Callers must validate the policy first (see
/// [`PolicyCompiler::compile`](super::PolicyCompiler::compile)); this
/// function assumes the repository token is well-formed.
#[must_use]
pub(crate) fn build(policy: &TrustPolicy) -> String {
    let mut clauses = Vec::new();

    // Clause 1: exact repository pin. Always present, always first.
    clauses.push(format!("attribute.repository=='{}'", policy.repository));

    if policy.block_forked_repos
        && let Some(owner) = policy.repository_owner()
    {
        clauses.push(format!("attribute.repository_owner=='{owner}'"));
    }

    if policy.require_actor {
        clauses.push(String::from("has(attribute.actor)"));
    }

    if policy.validate_workflow_path {
        clauses.push(format!(
            "attribute.job_workflow_ref.startsWith('{}/')",
            policy.repository
        ));
    }

    if !policy.allowed_branches.is_empty() {
        clauses.push(ref_list_clause(
            "attribute.ref",
            "heads",
            &policy.allowed_branches,
        ));
    }

    if !policy.allowed_tags.is_empty() {
        clauses.push(ref_list_clause(
            "attribute.ref",
            "tags",
            &policy.allowed_tags,
        ));
    }

    if policy.allow_pull_requests {
        clauses.push(pull_request_clause(&policy.allowed_branches));
    }

    let restriction = clauses.join(" && ");

    if policy.trusted_repositories.is_empty() {
        restriction
    } else {
        // Escape hatch: trusted repositories are admitted unconditionally.
        // Both arms are parenthesized so the bypass is precedence-proof.
        let overrides = policy
            .trusted_repositories
            .iter()
            .map(|repo| format!("attribute.repository=='{repo}'"))
            .collect::<Vec<_>>()
            .join(" || ");
        format!("({restriction}) || ({overrides})")
    }
}

/// Builds a parenthesized disjunction admitting a list of refs under the
/// given namespace (`heads` or `tags`).
fn ref_list_clause(attribute: &str, namespace: &str, entries: &[String]) -> String {
    let terms = entries
        .iter()
        .map(|entry| ref_term(attribute, namespace, entry))
        .collect::<Vec<_>>()
        .join(" || ");
    format!("({terms})")
}

/// Builds one ref term, compiling glob entries into prefix or regex
/// matches.
fn ref_term(attribute: &str, namespace: &str, entry: &str) -> String {
    if let Some(stem) = entry.strip_suffix('*')
        && !stem.contains('*')
    {
        format!("{attribute}.startsWith('refs/{namespace}/{stem}')")
    } else if entry.contains('*') {
        format!(
            "{attribute}.matches('^refs/{namespace}/{}$')",
            glob_to_regex(entry)
        )
    } else {
        format!("{attribute}=='refs/{namespace}/{entry}'")
    }
}

/// Builds the pull-request admission clause: tokens must come from a pull
/// ref and carry the pull_request claim; when branches are restricted, the
/// pull request must also target an allowed base branch.
fn pull_request_clause(allowed_branches: &[String]) -> String {
    let mut terms = vec![
        String::from("attribute.ref.startsWith('refs/pull/')"),
        String::from("has(attribute.pull_request)"),
    ];

    if !allowed_branches.is_empty() {
        terms.push(ref_list_clause("attribute.base_ref", "heads", allowed_branches));
    }

    format!("({})", terms.join(" && "))
}

/// Translates a glob entry into an anchored-regex body, escaping every
/// regex metacharacter except `*`, which becomes `.*`.
fn glob_to_regex(entry: &str) -> String {
    let mut regex = String::with_capacity(entry.len() * 2);
    for c in entry.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '.' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                regex.push('\\');
                regex.push(c);
            }
            _ => regex.push(c),
        }
    }
    regex
}

/// Splits an expression into its top-level conjuncts, respecting
/// parentheses.
///
/// Used by tests to re-parse compiled expressions, and by the CLI to
/// display one clause per line.
#[must_use]
pub fn top_level_conjuncts(expression: &str) -> Vec<&str> {
    let mut conjuncts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let bytes = expression.as_bytes();

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'&' if depth == 0
                && i + 1 < bytes.len()
                && bytes[i + 1] == b'&' =>
            {
                conjuncts.push(expression[start..i].trim());
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    let tail = expression[start..].trim();
    if !tail.is_empty() {
        conjuncts.push(tail);
    }
    conjuncts
}
