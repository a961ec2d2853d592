//! Placeholder expansion for request paths and bodies
//!
//! Recognised placeholders:
//! - `{rand_int:a:b}`: uniform integer in `[a, b]`
//! - `{rand_string:n}`: `n` random alphanumeric characters
//! - `{env:NAME}`: value of the run environment variable `NAME`
//! - `{env:NAME:fallback}`: same, with `fallback` used when `NAME` is unset
//!
//! Any other brace-delimited text is copied through unchanged.

use once_cell::sync::Lazy;
use rand::distr::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::errors::HttpError;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(rand_int|rand_string|env):([^{}]*)\}").expect("placeholder pattern is valid")
});

/// Expand every placeholder in `template`
pub fn expand<R, E>(template: &str, env: E, rng: &mut R) -> Result<String, HttpError>
where
    R: Rng,
    E: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for captures in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(kind), Some(args)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        let placeholder = whole.as_str();
        let value = match kind.as_str() {
            "rand_int" => rand_int(placeholder, args.as_str(), &mut *rng)?,
            "rand_string" => rand_string(placeholder, args.as_str(), &mut *rng)?,
            _ => env_var(args.as_str(), &env)?,
        };
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Expand placeholders in every string of a JSON document
pub fn expand_json<R, E>(value: &JsonValue, env: &E, rng: &mut R) -> Result<JsonValue, HttpError>
where
    R: Rng,
    E: Fn(&str) -> Option<String>,
{
    Ok(match value {
        JsonValue::String(s) => JsonValue::String(expand(s, env, &mut *rng)?),
        JsonValue::Array(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| expand_json(item, env, &mut *rng))
                .collect::<Result<_, _>>()?,
        ),
        JsonValue::Object(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(key, item)| Ok((key.clone(), expand_json(item, env, &mut *rng)?)))
                .collect::<Result<_, HttpError>>()?,
        ),
        other => other.clone(),
    })
}

fn env_var<E>(args: &str, env: &E) -> Result<String, HttpError>
where
    E: Fn(&str) -> Option<String>,
{
    let (name, fallback) = match args.split_once(':') {
        Some((name, fallback)) => (name, Some(fallback)),
        None => (args, None),
    };
    env(name)
        .or_else(|| fallback.map(str::to_string))
        .ok_or_else(|| HttpError::MissingVariable(name.to_string()))
}

fn rand_int<R: Rng>(placeholder: &str, args: &str, rng: &mut R) -> Result<String, HttpError> {
    let bounds: Vec<&str> = args.split(':').collect();
    let [low, high] = bounds.as_slice() else {
        return Err(HttpError::placeholder(placeholder, "expected two bounds"));
    };
    let parse = |bound: &str| {
        bound
            .trim()
            .parse::<i64>()
            .map_err(|e| HttpError::placeholder(placeholder, e.to_string()))
    };
    let (low, high) = (parse(*low)?, parse(*high)?);
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    Ok(rng.random_range(low..=high).to_string())
}

fn rand_string<R: Rng>(
    placeholder: &str,
    args: &str,
    rng: &mut R,
) -> Result<String, HttpError> {
    let len: usize = args
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| HttpError::placeholder(placeholder, e.to_string()))?;
    Ok((0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect())
}
