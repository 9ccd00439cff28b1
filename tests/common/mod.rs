//! Shared fixtures: a temp-dir config, deterministic stub gateways, and an
//! [`App`] wired to them.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use policy_check::app::App;
use policy_check::config::{parse_config, Config};
use policy_check::{db, migrate};
use policy_check_core::embedding::Embedder;
use policy_check_core::generation::Generator;
use policy_check_core::ComplianceError;

pub const HIGH_VERDICT: &str = r#"{
    "overall_risk": "HIGH",
    "issues": [{
        "type": "Confidentiality",
        "policy_reference": "Confidentiality Policy",
        "excerpt": "merger terms",
        "explanation": "Merger terms are restricted information"
    }],
    "suggested_text": "I can't share details about this yet."
}"#;

pub fn test_config(tmp: &TempDir, extra: &str) -> Config {
    let root = tmp.path().display();
    let text = format!(
        r#"[db]
path = "{root}/data/pchk.sqlite"

[storage]
dir = "{root}/data/policies"

[chunking]
chunk_size = 120
overlap = 20

[server]
bind = "127.0.0.1:0"
{extra}
"#
    );
    parse_config(&text).unwrap()
}

pub fn storage_dir(tmp: &TempDir) -> PathBuf {
    tmp.path().join("data").join("policies")
}

/// Bag-of-words hashing embedder.
#[derive(Default)]
pub struct HashEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-64"
    }

    fn dims(&self) -> usize {
        64
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ComplianceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 64];
                for word in text.to_lowercase().split_whitespace() {
                    let bucket = word
                        .bytes()
                        .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
                        % 64;
                    v[bucket] += 1.0;
                }
                v
            })
            .collect())
    }
}

/// Generator that always answers with the same text.
pub struct FixedGenerator {
    pub answer: String,
    pub calls: AtomicUsize,
}

impl FixedGenerator {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for FixedGenerator {
    fn model_name(&self) -> &str {
        "fixed"
    }

    async fn generate(
        &self,
        _system_instruction: &str,
        _user_prompt: &str,
        _json_output: bool,
    ) -> Result<String, ComplianceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

/// A migrated database in `tmp` with stub gateways.
pub async fn test_app(
    tmp: &TempDir,
    embedder: Arc<HashEmbedder>,
    generator: Arc<FixedGenerator>,
) -> App {
    let cfg = test_config(tmp, "");
    let pool = db::connect(&cfg).await.unwrap();
    migrate::migrate(&pool).await.unwrap();
    App::with_gateways(&cfg, pool, embedder, generator)
}
