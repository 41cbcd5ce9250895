use crate::core::select::OnlyUse;
use anyhow::{anyhow, Context, Result};
use range_parser::parse;

/// Parse GPU indices from string inputs, supporting ranges like "0-2" or comma-separated "0,1,2".
///
/// The result is sorted and free of duplicates.
///
/// # Examples
///
/// ```
/// use freegpus::utils::parsers::parse_gpu_indices;
///
/// assert_eq!(parse_gpu_indices("0").unwrap(), vec![0]);
/// assert_eq!(parse_gpu_indices("0,2,4").unwrap(), vec![0, 2, 4]);
/// assert_eq!(parse_gpu_indices("0-2").unwrap(), vec![0, 1, 2]);
/// assert_eq!(parse_gpu_indices("3, 1").unwrap(), vec![1, 3]);
/// ```
pub fn parse_gpu_indices(gpu_string: &str) -> Result<Vec<u32>> {
    let input = gpu_string.trim();
    if input.is_empty() {
        return Err(anyhow!("GPU index list cannot be empty"));
    }

    let mut parsed = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(anyhow!("Empty entry in GPU index list: {gpu_string}"));
        }
        let indices = parse::<u32>(part)
            .with_context(|| format!("Invalid GPU index or range: {part}"))?;
        parsed.extend(indices);
    }

    parsed.sort_unstable();
    parsed.dedup();

    Ok(parsed)
}

/// Parse the `--only-use` argument into the set of allowed GPU indices.
///
/// # Examples
///
/// ```
/// use freegpus::utils::parsers::parse_only_use;
///
/// let only_use = parse_only_use("2,0-1").unwrap();
/// assert_eq!(only_use.indices().collect::<Vec<_>>(), vec![0, 1, 2]);
/// ```
pub fn parse_only_use(spec: &str) -> Result<OnlyUse> {
    Ok(parse_gpu_indices(spec)?.into_iter().collect())
}
