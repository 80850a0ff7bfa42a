use sha2::{Digest, Sha256};

use crate::crd::CheckType;

pub const MAX_TASK_NAME_LENGTH: usize = 32;
pub const MAX_EVALUATION_NAME_LENGTH: usize = 27;
pub const MAX_JOB_NAME_LENGTH: usize = 50;
pub const MAX_K8S_OBJECT_LENGTH: usize = 253;
pub const MIN_NAME_PART_LENGTH: usize = 5;

fn random_suffix() -> u32 {
    rand::random_range(10_000..99_999)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// `{check}-{definition}-{random}`; not reproducible, persist the result.
pub fn generate_task_name(check_type: CheckType, task_name: &str) -> String {
    format!(
        "{}-{}-{}",
        check_type,
        truncate(task_name, MAX_TASK_NAME_LENGTH),
        random_suffix()
    )
}

/// Like [`generate_task_name`] with a shorter definition part.
pub fn generate_evaluation_name(
    check_type: CheckType,
    evaluation_name: &str,
) -> String {
    format!(
        "{}-{}-{}",
        check_type,
        truncate(evaluation_name, MAX_EVALUATION_NAME_LENGTH),
        random_suffix()
    )
}

pub fn generate_job_name(name: &str) -> String {
    format!("{}-{}", truncate(name, MAX_JOB_NAME_LENGTH), random_suffix())
}

/// First 8 hex characters of the SHA-256 of the decimal generation.
pub fn hash(generation: i64) -> String {
    let digest = Sha256::digest(generation.to_string().as_bytes());
    hex::encode(&digest[..4])
}

/// Join `parts` with `-`, shortening the longest parts (never below
/// `min_part_len`) until the result fits in `max_len`.
pub fn create_resource_name(
    max_len: usize,
    min_part_len: usize,
    parts: &[&str],
) -> String {
    let mut parts: Vec<&str> = parts.to_vec();
    let joined_len = |parts: &[&str]| {
        parts.iter().map(|p| p.chars().count()).sum::<usize>()
            + parts.len().saturating_sub(1)
    };

    while joined_len(&parts) > max_len {
        let Some((idx, longest)) = parts
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| p.chars().count())
            .map(|(i, p)| (i, p.chars().count()))
        else {
            break;
        };
        if longest <= min_part_len {
            break;
        }
        let overflow = joined_len(&parts) - max_len;
        let keep = longest.saturating_sub(overflow).max(min_part_len);
        parts[idx] = truncate(parts[idx], keep);
    }
    parts.join("-")
}

/// Deterministic name of the app version recorded for `generation`.
pub fn app_version_name(app: &str, version: &str, generation: i64) -> String {
    create_resource_name(
        MAX_K8S_OBJECT_LENGTH,
        MIN_NAME_PART_LENGTH,
        &[app, version, &hash(generation)],
    )
}

pub fn workload_version_name(app: &str, workload: &str, version: &str) -> String {
    create_resource_name(
        MAX_K8S_OBJECT_LENGTH,
        MIN_NAME_PART_LENGTH,
        &[app, workload, version],
    )
}
