//! Configuration
//!
//! CLI arguments and environment variable handling using clap, plus the
//! immutable verifier configuration passed into every verification entry
//! point.

use std::path::PathBuf;

use clap::Parser;

/// ProvenDB open source verification CLI
#[derive(Parser, Debug, Clone)]
#[command(name = "provendb-verify")]
#[command(about = "ProvenDB Open Source Verification CLI", version)]
pub struct Args {
    /// Resolvable MongoDB URI connection string for the verification
    /// target. Explicitly specified options such as '--ssl=false' take
    /// precedence over the URI
    #[arg(long, default_value = "mongodb://localhost:27017")]
    pub uri: String,

    /// MongoDB host for the verification target
    #[arg(long)]
    pub host: Option<String>,

    /// MongoDB port for the verification target
    #[arg(long)]
    pub port: Option<u16>,

    /// Use SSL for the MongoDB connection
    #[arg(
        long,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub ssl: Option<bool>,

    /// Username for the MongoDB authentication
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Password for the MongoDB authentication
    #[arg(long, short = 'p')]
    pub password: Option<String>,

    /// Database to be used for authentication
    #[arg(long = "authDatabase", visible_alias = "adb")]
    pub auth_database: Option<String>,

    /// Database as the verification target
    #[arg(long, visible_alias = "db")]
    pub database: Option<String>,

    /// Comma separated list of ignored collections
    #[arg(long = "ignoredCollections", value_delimiter = ',')]
    pub ignored_collections: Vec<String>,

    /// ProvenDB Proof ID; the version in that Proof is used as
    /// '--versionId'
    #[arg(long = "proofId", visible_alias = "pid")]
    pub proof_id: Option<String>,

    /// Version to be verified. Use 'current' to verify the most recent
    /// version
    #[arg(long = "versionId", visible_alias = "vid")]
    pub version_id: Option<String>,

    /// Path to a ProvenDB Proof Archive (.zip) or an external Chainpoint
    /// Proof either in base64 (.txt) or JSON (.json)
    #[arg(long = "in", short = 'i')]
    pub input: Option<PathBuf>,

    /// Path to an RSA public key (.pem) to verify the signature contained
    /// in a Proof
    #[arg(long = "pubKey")]
    pub pub_key: Option<PathBuf>,

    /// List all the verifiable versions along with ProvenDB Proof IDs for
    /// the target database
    #[arg(long = "listVersions", visible_alias = "ls")]
    pub list_versions: bool,

    /// Collection name of the document to be verified; requires
    /// '--docFilter'
    #[arg(long, visible_alias = "col")]
    pub collection: Option<String>,

    /// Filter in MongoDB extended JSON to get the document as the
    /// verification target; requires '--collection'
    #[arg(long = "docFilter", visible_alias = "df")]
    pub doc_filter: Option<String>,

    /// Path to output the Chainpoint Proof when verified; must end in
    /// '.json' or '.txt'
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Print out debug information
    #[arg(long)]
    pub debug: bool,

    /// Skip checking document hashes against document metadata
    #[arg(long = "skipDocCheck")]
    pub skip_doc_check: bool,

    /// Verify a proof's anchors independently against chain data instead
    /// of relying on the proof's anchor URIs
    #[arg(
        long = "verifyAnchorIndependently",
        env = "PROVENDB_VERIFY_VERIFY_ANCHOR_INDEPENDENTLY",
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true",
        value_name = "BOOL"
    )]
    pub verify_anchor_independently: bool,
}

impl Args {
    /// Cross-option validation the derive attributes cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.version_id.is_some() && self.proof_id.is_some() {
            return Err("'--versionId' and '--proofId' cannot be both set".to_string());
        }

        if self.collection.is_some() != self.doc_filter.is_some() {
            return Err(
                "'--collection' and '--docFilter' must be both specified or left out".to_string(),
            );
        }

        if let Some(out) = &self.out {
            match out.extension().and_then(|e| e.to_str()) {
                Some("json") | Some("txt") => {}
                _ => {
                    return Err(
                        "filename in '--out' must end in either '.json' or '.txt'".to_string()
                    )
                }
            }
        }

        self.version_id_num().map(|_| ())
    }

    /// The requested version number, or `None` for the current version.
    pub fn version_id_num(&self) -> Result<Option<i64>, String> {
        match self.version_id.as_deref() {
            None | Some("current") => Ok(None),
            Some(v) => {
                let num: i64 = v
                    .parse()
                    .map_err(|e| format!("invalid '--versionId': {e}"))?;

                if num < 1 {
                    return Err("invalid '--versionId': version must be >= 1".to_string());
                }

                Ok(Some(num))
            }
        }
    }
}

/// Immutable configuration threaded through every verification entry point
#[derive(Debug, Clone, Default)]
pub struct VerifierConfig {
    pub debug: bool,
    /// Skip comparing computed document hashes to recorded metadata hashes
    pub skip_doc_check: bool,
    /// Query chain endpoints directly instead of echoing anchor URIs
    pub verify_anchor_independently: bool,
    /// Block-explorer API token
    pub bc_token: String,
    /// Hedera mirror-node API key
    pub dragonglass_api_key: String,
}

impl VerifierConfig {
    /// Builds the verifier configuration from parsed arguments and the
    /// process environment.
    pub fn from_args(args: &Args) -> Self {
        VerifierConfig {
            debug: args.debug,
            skip_doc_check: args.skip_doc_check,
            verify_anchor_independently: args.verify_anchor_independently,
            bc_token: std::env::var("PROVENDB_VERIFY_BCTOKEN").unwrap_or_default(),
            dragonglass_api_key: std::env::var("PROVENDB_VERIFY_DRAGONGLASS_API_KEY")
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["provendb-verify"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn version_and_proof_id_exclusive() {
        let a = args(&["--versionId", "3", "--proofId", "abc"]);
        assert!(a.validate().is_err());
    }

    #[test]
    fn collection_requires_doc_filter() {
        assert!(args(&["--collection", "accounts"]).validate().is_err());
        assert!(args(&["--docFilter", "{}"]).validate().is_err());
        assert!(args(&["--collection", "accounts", "--docFilter", "{}"])
            .validate()
            .is_ok());
    }

    #[test]
    fn out_extension_checked() {
        assert!(args(&["--out", "proof.bin"]).validate().is_err());
        assert!(args(&["--out", "proof.json"]).validate().is_ok());
        assert!(args(&["--out", "proof.txt"]).validate().is_ok());
    }

    #[test]
    fn version_id_parsing() {
        assert_eq!(args(&[]).version_id_num().unwrap(), None);
        assert_eq!(
            args(&["--versionId", "current"]).version_id_num().unwrap(),
            None
        );
        assert_eq!(args(&["--versionId", "7"]).version_id_num().unwrap(), Some(7));
        assert!(args(&["--versionId", "0"]).version_id_num().is_err());
        assert!(args(&["--versionId", "x"]).version_id_num().is_err());
    }
}
