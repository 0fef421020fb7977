//! `--step "Name:1m30s"` argument parsing.

use cadence_core::Step;

/// Parse `90`, `45s`, `2m` or `1m30s` into seconds.
pub fn parse_duration(input: &str) -> Result<u32, String> {
    let s = input.trim().to_ascii_lowercase();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u32>() {
        return Ok(secs);
    }

    let invalid = || format!("invalid duration '{}' (use 90, 45s, 2m or 1m30s)", input.trim());
    let (minutes, rest) = match s.split_once('m') {
        Some((m, rest)) => (m.parse::<u32>().map_err(|_| invalid())?, rest),
        None => (0, s.as_str()),
    };
    let seconds = match rest {
        "" => 0,
        r => r
            .strip_suffix('s')
            .ok_or_else(invalid)?
            .parse::<u32>()
            .map_err(|_| invalid())?,
    };
    minutes
        .checked_mul(60)
        .and_then(|m| m.checked_add(seconds))
        .ok_or_else(invalid)
}

/// Parse `Name:DURATION`. The last `:` separates the duration so names may contain colons.
pub fn parse_step(input: &str) -> Result<Step, String> {
    let (name, duration) = input
        .rsplit_once(':')
        .ok_or_else(|| format!("step '{}' must look like Name:DURATION", input))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("step '{}' has no name", input));
    }
    Ok(Step::new(name, parse_duration(duration)?))
}

pub fn parse_steps<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Step>, String> {
    inputs.iter().map(|s| parse_step(s.as_ref())).collect()
}
