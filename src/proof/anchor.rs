//! Anchor verification
//!
//! Fans out over the branches of an evaluated proof and checks every anchor
//! against its claims. Two modes exist per anchor URI:
//!
//! - **Echo mode**: GET the URI and compare the body to the expected value.
//! - **Independent mode**: parse the trailing `/{chain-tag}/{txid}` segments
//!   and query the corresponding chain endpoint directly, so verification
//!   does not rely on the proof's own URI echo.
//!
//! Chainpoint calendar URIs are skipped in both modes; the calendar network
//! has been retired and its anchors carry no independent weight.
//!
//! Branches verify concurrently; a falsifying result cancels the remaining
//! work in its group, while transport failures surface unchanged after
//! every sibling has had the chance to report something stronger.

use std::sync::OnceLock;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::VerifierConfig;
use crate::httputil;
use crate::types::{Result, VerificationStatus, VerifyError};

use super::eval::{EvaluatedBranch, EvaluatedProof};
use super::BTC_BRANCH_LABEL;

const BLOCKCYPHER_BASE: &str = "https://api.blockcypher.com/v1/btc/main";
const ETH_RINKEBY_RPC: &str = "https://rpc.ankr.com/eth_rinkeby";
const ETH_MAINNET_RPC: &str = "https://rpc.ankr.com/eth";
const ETH_ELASTOS_RPC: &str = "https://api.elastos.io/esc";
const DRAGONGLASS_API: &str = "https://api.dragonglass.me/hedera/api/v1/transactions";

/// Matches the trailing `/{chain-tag}/{txid}` segments of an anchor URI
fn anchor_uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(\w+)/([0-9a-f]+)$").expect("anchor URI regex compiles"))
}

/// Verifies every anchor in an evaluated proof.
pub async fn verify(cfg: &VerifierConfig, evaluated: &EvaluatedProof) -> Result<()> {
    let client = reqwest::Client::new();

    verify_branches(cfg, &client, &evaluated.branches)
        .await
        .map_err(|e| e.with_prefix("failed to verify Proof anchors: "))
}

/// Drains a group of verification futures, returning the most damning
/// result: a falsifying error wins immediately (cancelling the rest of the
/// group), otherwise the first unverifiable error, otherwise the first
/// transport error.
async fn run_group<'a>(
    futures: impl IntoIterator<Item = BoxFuture<'a, Result<()>>>,
) -> Result<()> {
    let mut group: FuturesUnordered<_> = futures.into_iter().collect();
    let mut unverifiable: Option<VerifyError> = None;
    let mut transport: Option<VerifyError> = None;

    while let Some(result) = group.next().await {
        if let Err(e) = result {
            match e.status() {
                Some(VerificationStatus::Falsified) => return Err(e),
                Some(_) => {
                    if unverifiable.is_none() {
                        unverifiable = Some(e);
                    }
                }
                None => {
                    if transport.is_none() {
                        transport = Some(e);
                    }
                }
            }
        }
    }

    if let Some(e) = unverifiable {
        return Err(e);
    }
    if let Some(e) = transport {
        return Err(e);
    }

    Ok(())
}

fn verify_branches<'a>(
    cfg: &'a VerifierConfig,
    client: &'a reqwest::Client,
    branches: &'a [EvaluatedBranch],
) -> BoxFuture<'a, Result<()>> {
    async move {
        let mut tasks: Vec<BoxFuture<'a, Result<()>>> = Vec::new();

        for branch in branches {
            match branch.label.as_deref() {
                Some(BTC_BRANCH_LABEL) => {
                    tasks.push(verify_bitcoin_branch(cfg, client, branch).boxed());
                }
                _ => {
                    tasks.push(verify_branch_anchors(cfg, client, branch).boxed());
                }
            }

            if !branch.branches.is_empty() {
                tasks.push(verify_branches(cfg, client, &branch.branches));
            }
        }

        run_group(tasks).await
    }
    .boxed()
}

/// Verifies the URIs of every anchor in a non-Bitcoin branch.
async fn verify_branch_anchors(
    cfg: &VerifierConfig,
    client: &reqwest::Client,
    branch: &EvaluatedBranch,
) -> Result<()> {
    if !branch.anchors.is_empty() {
        info!(
            label = branch.label.as_deref().unwrap_or(""),
            "verifying anchor branch"
        );
    }

    let tasks = branch.anchors.iter().map(|anchor| {
        verify_anchor_uris(cfg, client, &anchor.uris, &anchor.expected_value).boxed()
    });

    run_group(tasks).await
}

/// Verifies a Bitcoin branch: anchor URIs, the anchored block's merkle
/// root, and the transaction's OP_RETURN payload.
async fn verify_bitcoin_branch(
    cfg: &VerifierConfig,
    client: &reqwest::Client,
    branch: &EvaluatedBranch,
) -> Result<()> {
    info!("verifying Bitcoin anchor branch");

    let tx_id = branch.btc_tx_id.as_deref().ok_or_else(|| {
        VerifyError::falsified("missing transaction id in Bitcoin anchor branch")
    })?;
    let op_return = branch.op_return_value.as_deref().ok_or_else(|| {
        VerifyError::falsified("missing OP_RETURN value in Bitcoin anchor branch")
    })?;

    let mut tasks: Vec<BoxFuture<'_, Result<()>>> = Vec::new();

    for anchor in &branch.anchors {
        tasks.push(
            verify_anchor_uris(cfg, client, &anchor.uris, &anchor.expected_value).boxed(),
        );
        tasks.push(
            verify_bitcoin_block_merkle_root(cfg, client, &anchor.anchor_id, &anchor.expected_value)
                .boxed(),
        );
    }

    tasks.push(verify_bitcoin_tx_data(cfg, client, tx_id, op_return).boxed());

    run_group(tasks).await
}

async fn verify_anchor_uris(
    cfg: &VerifierConfig,
    client: &reqwest::Client,
    uris: &[String],
    expected_value: &str,
) -> Result<()> {
    let tasks = uris
        .iter()
        .map(|uri| verify_anchor_uri(cfg, client, uri, expected_value).boxed());

    run_group(tasks).await
}

async fn verify_anchor_uri(
    cfg: &VerifierConfig,
    client: &reqwest::Client,
    uri: &str,
    expected_value: &str,
) -> Result<()> {
    if uri.contains("/calendar/") {
        // retired Chainpoint calendar network
        debug!(uri, "skipping calendar anchor URI");
        return Ok(());
    }

    if cfg.verify_anchor_independently {
        return verify_anchor_uri_independently(cfg, client, uri, expected_value).await;
    }

    let actual_value = httputil::get_text(client, uri).await?;

    if actual_value != expected_value {
        return Err(VerifyError::falsified(format!(
            "anchor URI {uri} returns {actual_value}, but expect {expected_value}"
        )));
    }

    Ok(())
}

/// Queries the chain identified by the URI's trailing
/// `/{chain-tag}/{txid}` segments instead of trusting the URI echo.
async fn verify_anchor_uri_independently(
    cfg: &VerifierConfig,
    client: &reqwest::Client,
    uri: &str,
    expected_value: &str,
) -> Result<()> {
    let captures = anchor_uri_regex().captures(uri).ok_or_else(|| {
        VerifyError::unverifiable(format!(
            "verify anchor URI `{uri}` independently is not supported"
        ))
    })?;

    let chain_tag = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let tx_id = captures.get(2).map(|m| m.as_str()).unwrap_or_default();

    debug!(chain_tag, tx_id, "verifying anchor independently");

    match chain_tag {
        "eth" => verify_eth_tx_data(client, ETH_RINKEBY_RPC, tx_id, expected_value).await,
        "eth_mainnet" => verify_eth_tx_data(client, ETH_MAINNET_RPC, tx_id, expected_value).await,
        "eth_elastos" => verify_eth_tx_data(client, ETH_ELASTOS_RPC, tx_id, expected_value).await,
        "btc" | "btc_mainnet" => verify_bitcoin_tx_data(cfg, client, tx_id, expected_value).await,
        "hedera" | "hedera_mainnet" => {
            verify_hedera_tx_memo(cfg, client, tx_id, expected_value).await
        }
        _ => Err(VerifyError::unverifiable(format!(
            "verify anchor URI `{uri}` independently is not supported"
        ))),
    }
}

/// Compares the input data of an Ethereum transaction to the expected
/// value via JSON-RPC `eth_getTransactionByHash`.
async fn verify_eth_tx_data(
    client: &reqwest::Client,
    rpc_url: &str,
    tx_id: &str,
    expected_value: &str,
) -> Result<()> {
    info!(tx_id, "verifying Ethereum transaction data");

    let request = json!({
        "jsonrpc": "2.0",
        "method": "eth_getTransactionByHash",
        "params": [format!("0x{tx_id}")],
        "id": 1,
    });

    let response = httputil::post_json(client, rpc_url, &request).await?;

    if let Some(error) = response.get("error") {
        return Err(VerifyError::Transport(error.to_string()));
    }

    let input = response
        .pointer("/result/input")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            VerifyError::Transport(format!("cannot get input data of Ethereum transaction {tx_id}"))
        })?;

    let actual_value = input.trim_start_matches("0x");

    if actual_value != expected_value {
        return Err(VerifyError::falsified(format!(
            "Ethereum transaction 0x{tx_id} has input data {actual_value}, but expect {expected_value}"
        )));
    }

    Ok(())
}

/// Compares a Bitcoin block's merkle root at the given height to the
/// expected value.
async fn verify_bitcoin_block_merkle_root(
    cfg: &VerifierConfig,
    client: &reqwest::Client,
    block_height: &str,
    expected_value: &str,
) -> Result<()> {
    info!(block_height, "verifying Bitcoin block merkle root");

    let url = format!(
        "{BLOCKCYPHER_BASE}/blocks/{block_height}?txstart=1&limit=1&token={}",
        cfg.bc_token
    );
    let body = httputil::get_json(client, &url).await?;

    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Err(VerifyError::Transport(error.to_string()));
    }

    let actual_value = body
        .get("mrkl_root")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if actual_value != expected_value {
        return Err(VerifyError::falsified(format!(
            "Bitcoin block height {block_height} has merkle root {actual_value}, but expect {expected_value}"
        )));
    }

    debug!(block_height, merkle_root = actual_value, "Bitcoin block checked");

    Ok(())
}

/// Compares the OP_RETURN payload of a Bitcoin transaction to the expected
/// value.
async fn verify_bitcoin_tx_data(
    cfg: &VerifierConfig,
    client: &reqwest::Client,
    tx_id: &str,
    expected_value: &str,
) -> Result<()> {
    info!(tx_id, "verifying Bitcoin transaction OP_RETURN");

    let url = format!("{BLOCKCYPHER_BASE}/txs/{tx_id}?token={}", cfg.bc_token);
    let body = httputil::get_json(client, &url).await?;

    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Err(VerifyError::Transport(error.to_string()));
    }

    let actual_value = body
        .pointer("/outputs/0/data_hex")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if actual_value != expected_value {
        return Err(VerifyError::falsified(format!(
            "Bitcoin transaction {tx_id} has OP_RETURN {actual_value}, but expect {expected_value}"
        )));
    }

    Ok(())
}

/// Compares the memo of a Hedera transaction, read from the mirror node,
/// to the expected value.
async fn verify_hedera_tx_memo(
    cfg: &VerifierConfig,
    client: &reqwest::Client,
    tx_id: &str,
    expected_value: &str,
) -> Result<()> {
    info!(tx_id, "verifying Hedera transaction memo");

    let response = client
        .get(format!("{DRAGONGLASS_API}?query={tx_id}"))
        .header("X-API-KEY", &cfg.dragonglass_api_key)
        .send()
        .await?;

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(VerifyError::Transport(format!(
            "got {status} from Hedera mirror node: {body}"
        )));
    }

    let body: Value = response.json().await?;

    let actual_value = body
        .pointer("/data/0/memo")
        .and_then(Value::as_str)
        .unwrap_or_default();

    if actual_value != expected_value {
        return Err(VerifyError::falsified(format!(
            "Hedera transaction {tx_id} has memo {actual_value}, but expect {expected_value}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::eval::EvaluatedAnchor;

    fn independent_cfg() -> VerifierConfig {
        VerifierConfig {
            verify_anchor_independently: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn calendar_uris_skipped_in_both_modes() {
        let client = reqwest::Client::new();
        let uri = "https://a.chainpoint.org/calendar/985635/hash";

        for cfg in [VerifierConfig::default(), independent_cfg()] {
            verify_anchor_uri(&cfg, &client, uri, "whatever")
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn unknown_chain_tag_is_unverifiable() {
        let client = reqwest::Client::new();
        let cfg = independent_cfg();

        let err = verify_anchor_uri(&cfg, &client, "https://sadfkasklfdkas", "ab")
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(VerificationStatus::Unverifiable));
        assert_eq!(
            err.to_string(),
            "verify anchor URI `https://sadfkasklfdkas` independently is not supported"
        );
    }

    #[test]
    fn uri_regex_extracts_chain_and_txid() {
        let caps = anchor_uri_regex()
            .captures("https://anchor.provendb.com/eth_mainnet/6cae5d7b052b92a6")
            .unwrap();
        assert_eq!(&caps[1], "eth_mainnet");
        assert_eq!(&caps[2], "6cae5d7b052b92a6");

        assert!(anchor_uri_regex().captures("https://example.com").is_none());
    }

    #[tokio::test]
    async fn falsified_dominates_transport_in_group() {
        let falsified = async { Err(VerifyError::falsified("anchor mismatched")) }.boxed();
        let transport =
            async { Err(VerifyError::Transport("connection refused".into())) }.boxed();
        let ok = async { Ok(()) }.boxed();

        let err = run_group(vec![transport, falsified, ok]).await.unwrap_err();
        assert_eq!(err.status(), Some(VerificationStatus::Falsified));
    }

    #[tokio::test]
    async fn unverifiable_dominates_transport_in_group() {
        let unverifiable = async { Err(VerifyError::unverifiable("unsupported")) }.boxed();
        let transport =
            async { Err(VerifyError::Transport("connection refused".into())) }.boxed();

        let err = run_group(vec![transport, unverifiable]).await.unwrap_err();
        assert_eq!(err.status(), Some(VerificationStatus::Unverifiable));
    }

    #[tokio::test]
    async fn all_ok_group_passes() {
        let tasks: Vec<BoxFuture<'static, Result<()>>> =
            (0..4).map(|_| async { Ok(()) }.boxed()).collect();
        assert!(run_group(tasks).await.is_ok());
    }

    #[tokio::test]
    async fn bitcoin_branch_requires_tx_material() {
        let cfg = VerifierConfig::default();
        let client = reqwest::Client::new();

        let branch = EvaluatedBranch {
            label: Some(BTC_BRANCH_LABEL.to_string()),
            anchors: vec![EvaluatedAnchor {
                anchor_type: "btc".to_string(),
                anchor_id: "503275".to_string(),
                uris: vec![],
                expected_value: "ab".repeat(32),
            }],
            ..Default::default()
        };

        let err = verify_bitcoin_branch(&cfg, &client, &branch)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(VerificationStatus::Falsified));
    }

    // The tests below hit live chain endpoints; run them explicitly with
    // `cargo test -- --ignored` when network access is available.

    #[tokio::test]
    #[ignore]
    async fn bitcoin_block_503275_merkle_root() {
        let cfg = VerifierConfig::default();
        let client = reqwest::Client::new();

        verify_bitcoin_block_merkle_root(
            &cfg,
            &client,
            "503275",
            "c617f5faca34474bea7020d75c39cb8427a32145f9646586ecb9184002131ad9",
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn bitcoin_tx_op_return() {
        let cfg = VerifierConfig::default();
        let client = reqwest::Client::new();

        verify_bitcoin_tx_data(
            &cfg,
            &client,
            "ba3c8c3e547ed73471c28a69659373f3f0a3b726aab31cdecd14513d9c581f1e",
            "267335262e21e7adb4220068b4b90b7ff066324935d7f61ceab2a64080b06b1b",
        )
        .await
        .unwrap();
    }
}
