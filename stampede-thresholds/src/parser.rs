//! Threshold grammar
//!
//! ```text
//! expression := statistic "(" selector ")" op number
//! predicate  := statistic op number
//! selector   := metric [ "{" tag ("," tag)* "}" ]
//! tag        := key (":" | "=") value
//! statistic  := ("p" | "percentile") "(" number ")" | "rate" | "count"
//!             | "avg" | "min" | "max" | "med" | "value"
//! op         := "<" | "<=" | ">" | ">=" | "==" | "!="
//! ```

use crate::error::{ThresholdError, ThresholdResult};
use crate::threshold::{Operator, Predicate, Selector, Statistic, Threshold};
use once_cell::sync::Lazy;
use regex::Regex;
use stampede_core::TagSet;

const NUMBER: &str = r"[-+]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][-+]?[0-9]+)?";

static SELECTOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<metric>[A-Za-z_][A-Za-z0-9_]*)\s*(?:\{(?P<tags>[^{}]*)\})?\s*$")
        .expect("selector regex is valid")
});

static PREDICATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?P<stat>[a-z]+(?:\(\s*[^()]*\s*\))?)\s*(?P<op><=|>=|==|!=|<|>)\s*(?P<bound>{})\s*$",
        NUMBER
    ))
    .expect("predicate regex is valid")
});

static EXPRESSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\s*(?P<stat>(?:percentile|p)\(\s*[^()]*\s*\)|[a-z]+)\s*\((?P<selector>[^()]*)\)\s*(?P<op><=|>=|==|!=|<|>)\s*(?P<bound>{})\s*$",
        NUMBER
    ))
    .expect("expression regex is valid")
});

/// Parse `name` or `name{key:value,...}`; `=` is accepted in place of `:`
pub fn parse_selector(input: &str) -> ThresholdResult<Selector> {
    let invalid = || ThresholdError::InvalidSelector(input.to_string());
    let captures = SELECTOR_RE.captures(input).ok_or_else(invalid)?;

    let mut tags = TagSet::new();
    if let Some(raw) = captures.name("tags") {
        for pair in raw.as_str().split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair
                .split_once(':')
                .or_else(|| pair.split_once('='))
                .ok_or_else(invalid)?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return Err(invalid());
            }
            tags.insert(key, value);
        }
    }

    Ok(Selector {
        metric: captures["metric"].to_string(),
        tags,
    })
}

/// Parse a statistic such as `p(95)`, `percentile(99.9)` or `rate`
pub fn parse_statistic(input: &str) -> ThresholdResult<Statistic> {
    let input = input.trim();
    let statistic = match input {
        "rate" => Statistic::Rate,
        "count" => Statistic::Count,
        "avg" => Statistic::Avg,
        "min" => Statistic::Min,
        "max" => Statistic::Max,
        "med" => Statistic::Med,
        "value" => Statistic::Value,
        _ => {
            let argument = input
                .strip_prefix("percentile(")
                .or_else(|| input.strip_prefix("p("))
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| ThresholdError::UnknownStatistic(input.to_string()))?;
            let p: f64 = argument
                .trim()
                .parse()
                .map_err(|_| ThresholdError::UnknownStatistic(input.to_string()))?;
            if !(0.0..=100.0).contains(&p) {
                return Err(ThresholdError::InvalidPercentile(p));
            }
            Statistic::Percentile(p)
        }
    };
    Ok(statistic)
}

fn parse_operator(input: &str) -> ThresholdResult<Operator> {
    Ok(match input {
        "<" => Operator::Lt,
        "<=" => Operator::Le,
        ">" => Operator::Gt,
        ">=" => Operator::Ge,
        "==" => Operator::Eq,
        "!=" => Operator::Ne,
        other => return Err(ThresholdError::InvalidPredicate(other.to_string())),
    })
}

fn parse_bound(input: &str, whole: &str) -> ThresholdResult<f64> {
    input
        .parse::<f64>()
        .ok()
        .filter(|b| b.is_finite())
        .ok_or_else(|| ThresholdError::InvalidPredicate(whole.to_string()))
}

/// Parse the configuration-form predicate, e.g. `p(95)<500`
pub fn parse_predicate(input: &str) -> ThresholdResult<Predicate> {
    let captures = PREDICATE_RE
        .captures(input)
        .ok_or_else(|| ThresholdError::InvalidPredicate(input.to_string()))?;

    Ok(Predicate {
        statistic: parse_statistic(&captures["stat"])?,
        operator: parse_operator(&captures["op"])?,
        bound: parse_bound(&captures["bound"], input)?,
    })
}

/// Parse the expression form, e.g. `percentile(95)(http_req_duration{endpoint=debts}) < 500`
pub fn parse_expression(input: &str) -> ThresholdResult<Threshold> {
    let captures = EXPRESSION_RE
        .captures(input)
        .ok_or_else(|| ThresholdError::InvalidExpression(input.to_string()))?;

    let selector = parse_selector(&captures["selector"])?;
    let predicate = Predicate {
        statistic: parse_statistic(&captures["stat"])?,
        operator: parse_operator(&captures["op"])?,
        bound: parse_bound(&captures["bound"], input)?,
    };
    Ok(Threshold::new(selector, predicate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_forms_agree() {
        let expression = parse_expression("percentile(95)(http_req_duration{endpoint=debts}) < 500")
            .unwrap();
        let config =
            Threshold::from_config("http_req_duration{endpoint:debts}", "p(95)<500").unwrap();
        assert_eq!(expression, config);

        let expression = parse_expression("rate(http_req_failed) < 0.01").unwrap();
        let config = Threshold::from_config("http_req_failed", "rate<0.01").unwrap();
        assert_eq!(expression, config);
    }

    #[test]
    fn test_selector_forms() {
        let selector = parse_selector("http_req_duration").unwrap();
        assert_eq!(selector.metric, "http_req_duration");
        assert!(selector.tags.is_empty());

        let selector = parse_selector("http_req_duration{endpoint:debts, operation:list}").unwrap();
        assert_eq!(selector.tags.get("endpoint"), Some("debts"));
        assert_eq!(selector.tags.get("operation"), Some("list"));
        assert_eq!(
            selector.to_string(),
            "http_req_duration{endpoint:debts,operation:list}"
        );

        assert!(parse_selector("").is_err());
        assert!(parse_selector("9lives").is_err());
        assert!(parse_selector("errors{endpoint}").is_err());
        assert!(parse_selector("errors{:debts}").is_err());
    }

    #[test]
    fn test_predicates() {
        let predicate = parse_predicate("p(99.9) <= 1500").unwrap();
        assert_eq!(predicate.statistic, Statistic::Percentile(99.9));
        assert_eq!(predicate.operator, Operator::Le);
        assert_eq!(predicate.bound, 1500.0);

        let predicate = parse_predicate("count>=100").unwrap();
        assert_eq!(predicate.statistic, Statistic::Count);
        assert_eq!(predicate.operator, Operator::Ge);

        let predicate = parse_predicate("value != 0").unwrap();
        assert_eq!(predicate.operator, Operator::Ne);

        let predicate = parse_predicate("avg<2e2").unwrap();
        assert_eq!(predicate.bound, 200.0);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            parse_predicate("p(95)"),
            Err(ThresholdError::InvalidPredicate(_))
        ));
        assert!(matches!(
            parse_predicate("mean<5"),
            Err(ThresholdError::UnknownStatistic(_))
        ));
        assert!(matches!(
            parse_predicate("p(150)<5"),
            Err(ThresholdError::InvalidPercentile(_))
        ));
        assert!(parse_predicate("rate=<0.1").is_err());
        assert!(parse_expression("rate http_req_failed < 0.1").is_err());
        assert!(parse_expression("p(x)(http_req_duration) < 1").is_err());
    }

    #[test]
    fn test_round_trips_through_display() {
        for (selector, predicate) in [
            ("checks", "rate>0.95"),
            ("http_req_duration{endpoint:health}", "p(99)<100"),
            ("iterations", "count>0"),
        ] {
            let threshold = Threshold::from_config(selector, predicate).unwrap();
            assert_eq!(threshold.selector.to_string(), selector);
            assert_eq!(threshold.predicate.to_string(), predicate);
        }
    }
}
