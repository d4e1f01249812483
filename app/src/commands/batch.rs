use anyhow::Context;
use perdiem_scraper::{BatchOutcome, LookupOrchestrator};
use std::path::Path;

/// Look up every code in order, spacing upstream requests.
pub async fn batch(orchestrator: &LookupOrchestrator, codes: &[String]) -> BatchOutcome {
    tracing::info!(count = codes.len(), "Starting batch lookup");
    let outcome = orchestrator.lookup_batch(codes).await;

    let flagged = orchestrator.take_flagged_for_review();
    if !flagged.is_empty() {
        tracing::warn!(
            count = flagged.len(),
            "Rate candidates rejected on bounds need manual review"
        );
    }
    outcome
}

/// Merge codes given as arguments with codes read from `file`.
///
/// Argument codes come first; duplicates are kept.
pub fn collect_codes(args: Vec<String>, file: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let mut codes = args;
    if let Some(path) = file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read code list {}", path.display()))?;
        codes.extend(parse_code_list(&contents));
    }
    Ok(codes)
}

/// Split a code list on whitespace and commas, skipping `#` comments.
#[must_use]
pub fn parse_code_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()))
        .filter(|token| !token.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_code_list() {
        let contents = "# Europe\n11410, 10450\n\n  10100 # Belgium\n";
        assert_eq!(parse_code_list(contents), ["11410", "10450", "10100"]);
    }

    #[test]
    fn test_collect_codes_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        writeln!(file, "10450\n10100").expect("write codes");

        let codes =
            collect_codes(vec!["11410".to_string()], Some(file.path())).expect("collect codes");
        assert_eq!(codes, ["11410", "10450", "10100"]);
    }

    #[test]
    fn test_missing_code_file() {
        let result = collect_codes(Vec::new(), Some(Path::new("/nonexistent/codes.txt")));
        assert!(result.is_err());
    }
}
