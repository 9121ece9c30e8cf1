//! provendb-verify CLI
//!
//! Exit codes: 0 when verified, 2 when falsified, 1 for configuration and
//! transport errors or an unverifiable outcome.

use clap::Parser;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use provendb_verify::config::{Args, VerifierConfig};
use provendb_verify::crypto::rsa::import_public_key_pem;
use provendb_verify::db::{self, mongo::DbTarget, versions::ProofLookup};
use provendb_verify::proof::binary;
use provendb_verify::types::{VerificationStatus, Verdict, VerifyError};
use provendb_verify::verify;

const ERROR_HELP_MSG: &str = "try 'provendb-verify -h' for more information";

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    // load environment variables from .env if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let default_filter = if args.debug {
        "provendb_verify=debug,info"
    } else {
        "provendb_verify=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        return cli_error(&e);
    }

    let cfg = VerifierConfig::from_args(&args);

    let pub_key = match &args.pub_key {
        Some(path) => {
            let pem = match std::fs::read_to_string(path) {
                Ok(pem) => pem,
                Err(e) => return cli_error(&format!("cannot load RSA public key: {e}")),
            };

            match import_public_key_pem(&pem) {
                Ok(key) => Some(key),
                Err(e) => return cli_error(&format!("cannot load RSA public key: {e}")),
            }
        }
        None => None,
    };

    let mut proof: Option<Value> = None;

    if let Some(input) = &args.input {
        if input.extension().and_then(|e| e.to_str()) == Some("zip") {
            return report_result(verify::verify_archive(&cfg, input, pub_key.as_ref()).await);
        }

        match binary::load_proof(input) {
            Ok(p) => {
                info!(path = %input.display(), "loading Chainpoint Proof");
                proof = Some(p);
            }
            Err(e) => return cli_error(&e.to_string()),
        }
    }

    let target = DbTarget {
        uri: args.uri.clone(),
        host: args.host.clone(),
        port: args.port,
        ssl: args.ssl,
        username: args.username.clone(),
        password: args.password.clone(),
        auth_database: args.auth_database.clone(),
        database: args.database.clone(),
    };

    let (client, database_name) = match db::connect(&target).await {
        Ok(connected) => connected,
        Err(e) => return cli_error(&e.to_string()),
    };

    let Some(database_name) = database_name else {
        // no database target: the proof itself is the verification target
        if let Some(proof) = &proof {
            return report_result(verify::verify_raw(&cfg, proof, pub_key.as_ref()).await);
        }

        return cli_error("please specify a database as the verification target");
    };

    let database = client.database(&database_name);

    if args.list_versions {
        return match db::verifiable_versions(&database).await {
            Ok(versions) => {
                println!(
                    "{:<36}\t{:<9}\t{:<30}\t{}",
                    "proofId", "version", "submitted", "status"
                );

                for v in versions {
                    println!(
                        "{:<36}\t{:<9}\t{:<30}\t{}",
                        v.proof_id,
                        v.version,
                        v.submitted.try_to_rfc3339_string().unwrap_or_default(),
                        v.status
                    );
                }

                0
            }
            Err(e) => cli_error(&format!("failed to list verifiable versions: {e}")),
        };
    }

    let mut version = match args.version_id_num() {
        Ok(v) => v,
        Err(e) => return cli_error(&e),
    };

    let mut scope_cols: Vec<String> = Vec::new();

    if version.is_none() {
        if let Some(proof_id) = &args.proof_id {
            // use proofId to resolve the version
            match db::get_proof(
                &database,
                ProofLookup::ProofId(proof_id),
                args.collection.as_deref(),
            )
            .await
            {
                Ok(stored) => {
                    version = Some(stored.version);
                    scope_cols = stored.collections;

                    if proof.is_none() {
                        proof = Some(stored.proof);
                    }
                }
                Err(e) => {
                    return cli_error(&format!(
                        "cannot get Chainpoint Proof using proofId {proof_id}: {e}"
                    ))
                }
            }
        } else {
            match db::latest_verifiable_version(&database).await {
                Ok(v) => version = Some(v),
                Err(e) => {
                    return cli_error(&format!(
                        "failed to get the latest verifiable version: {e}"
                    ))
                }
            }
        }
    }

    let version = version.expect("version resolved above");

    if proof.is_none() {
        match db::get_proof(
            &database,
            ProofLookup::Version(version),
            args.collection.as_deref(),
        )
        .await
        {
            Ok(stored) => {
                scope_cols = stored.collections;
                proof = Some(stored.proof);
            }
            Err(e) => {
                return cli_error(&format!(
                    "cannot get Chainpoint Proof using version {version}: {e}"
                ))
            }
        }
    }

    let proof = proof.expect("proof resolved above");

    let verdict = if let (Some(collection), Some(doc_filter)) = (&args.collection, &args.doc_filter)
    {
        verify::verify_document(
            &cfg,
            &database,
            &proof,
            version,
            &scope_cols,
            collection,
            doc_filter,
            &args.ignored_collections,
            args.out.as_deref(),
            pub_key.as_ref(),
        )
        .await
    } else {
        verify::verify_database(
            &cfg,
            &database,
            &proof,
            version,
            &scope_cols,
            &args.ignored_collections,
            args.out.as_deref(),
            pub_key.as_ref(),
        )
        .await
    };

    report_result(verdict)
}

fn report_result(result: Result<Verdict, VerifyError>) -> i32 {
    match result {
        Ok(verdict) => report(&verdict),
        Err(e) => {
            eprintln!("{e}");
            1
        }
    }
}

fn report(verdict: &Verdict) -> i32 {
    match verdict.status {
        VerificationStatus::Verified => {
            println!("PASS {}", verdict.message);
            0
        }
        VerificationStatus::Falsified => {
            match &verdict.detail {
                Some(detail) => println!("FAIL {}:\n\t{detail}", verdict.message),
                None => println!("FAIL {}", verdict.message),
            }
            2
        }
        VerificationStatus::Unverifiable => {
            match &verdict.detail {
                Some(detail) => println!("{}:\n\t{detail}", verdict.message),
                None => println!("{}", verdict.message),
            }
            1
        }
    }
}

fn cli_error(msg: &str) -> i32 {
    eprintln!("{msg}\n\n{ERROR_HELP_MSG}");
    1
}
