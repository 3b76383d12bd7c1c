use clap::Parser;

/// Process-level settings, resolved from CLI flags with environment-variable fallback — the same
/// `clap` `env` pattern the orchestration tool's CLI uses for `NCLAV_*` variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "ragcore", about = "Metadata ingestion and graph-RAG server")]
pub struct ServerSettings {
    #[arg(long, env = "RAGCORE_BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: String,

    #[arg(long, env = "RAGCORE_DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "RAGCORE_BLOB_ROOT", default_value = "./data/blobs")]
    pub blob_root: String,

    /// Cosine-similarity threshold above which an observed entity auto-merges into an existing
    /// node instead of entering the review queue.
    #[arg(long, env = "RAGCORE_AUTO_MERGE_THRESHOLD", default_value_t = 0.85)]
    pub auto_merge_threshold: f64,

    #[arg(long, env = "RAGCORE_LLM_PROVIDER")]
    pub llm_provider: Option<String>,

    #[arg(long, env = "RAGCORE_EMBEDDING_PROVIDER")]
    pub embedding_provider: Option<String>,

    #[arg(long, env = "RAGCORE_TOKEN")]
    pub bearer_token: Option<String>,

    #[arg(long, env = "RAGCORE_BOOTSTRAP_FILE")]
    pub bootstrap_file: Option<String>,
}

impl ServerSettings {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.auto_merge_threshold) {
            return Err("auto_merge_threshold must be between 0.0 and 1.0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_from_empty_args() {
        let settings = ServerSettings::parse_from(["ragcore"]);
        assert_eq!(settings.bind_addr, "0.0.0.0:8080");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut settings = ServerSettings::parse_from(["ragcore"]);
        settings.auto_merge_threshold = 1.5;
        assert!(settings.validate().is_err());
    }
}
