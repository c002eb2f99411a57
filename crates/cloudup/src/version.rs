use anyhow::Context;
use cloudup_core::config::normalize_kubernetes_version;
use colored::Colorize;

pub const STABLE_RELEASE_URL: &str =
    "https://storage.googleapis.com/kubernetes-release/release/stable.txt";

/// Latest stable kubernetes release as published at `url`
pub async fn fetch_stable_version(url: &str) -> anyhow::Result<String> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("User-Agent", "cloudup")
        .send()
        .await
        .with_context(|| format!("error fetching stable kubernetes version from {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!(
            "error fetching stable kubernetes version from {url}: {}",
            response.status()
        );
    }

    let body = response.text().await?;
    let version = body.trim().to_string();
    if version.is_empty() {
        anyhow::bail!("empty stable kubernetes version at {url}");
    }
    tracing::info!(version = %version, "Using latest stable kubernetes version");
    Ok(version)
}

/// Strip a leading `v`, warning when the input carried one
pub fn normalize(version: &str) -> String {
    let normalized = normalize_kubernetes_version(version);
    if normalized != version.trim() {
        eprintln!(
            "{} kubernetes version {:?} should not start with 'v', using {:?}",
            "Warning:".yellow().bold(),
            version,
            normalized
        );
        tracing::warn!(
            version = %version,
            normalized = %normalized,
            "Normalized kubernetes version"
        );
    }
    normalized
}
