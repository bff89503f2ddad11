//! JSON documents exchanged with the engine. Field names are a fixed contract.

use crate::config::Settings;
use crate::swap::SwapStatus;
use serde::{Deserialize, Serialize};

/// `proxyPort` value that tells the engine to connect directly.
pub const NO_PROXY_PORT: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub uuid: String,
    pub seed_base64: String,
    pub xmr_receive_address: String,
    pub electrum_url: String,
    pub proxy: String,
    pub libp2p_peer_address: String,
    pub xmr_rpc_endpoint: String,
    pub testnet: bool,
    pub proxy_port: i32,
    pub refund_address: String,
    pub swaps_account: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub seed_base64: String,
    pub swap_id: String,
    pub electrum_url: String,
    pub proxy: String,
    pub xmr_rpc_endpoint: String,
    pub testnet: bool,
    pub proxy_port: i32,
    pub swaps_account: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAndRefundRequest {
    pub root_bip32_key: String,
    pub swap_id: String,
    pub electrum_url: String,
    pub proxy: String,
    pub testnet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSellersRequest {
    pub seed_base64: String,
    pub proxy_port: i32,
    pub libp2p_rendezvous_address: String,
    pub testnet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHistoryRequest {
    pub testnet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetHistoryResponse {
    #[serde(default)]
    pub swaps: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub swap_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btc_lock_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btc_refund_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmr_lock_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmr_redeem_txid: Option<String>,
}

impl HistoryEntry {
    pub fn status(&self) -> SwapStatus {
        SwapStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSellersResponse {
    #[serde(default)]
    pub sellers: Vec<Seller>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seller {
    pub multiaddr: String,
    pub status: SellerStatus,
}

/// Quote of an online seller. Quantities and price are BTC decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerStatus {
    pub offline: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quantity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_quantity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAndRefundResponse {
    pub swap_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
}

/// Request fields that come from settings rather than from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    pub seed_base64: String,
    pub electrum_url: String,
    /// `127.0.0.1:<port>`, or empty without a proxy.
    pub proxy: String,
    pub proxy_port: i32,
    pub testnet: bool,
}

impl EngineParams {
    pub fn from_settings(settings: &Settings) -> Self {
        let socks_port = settings.proxy.socks_port;
        Self {
            seed_base64: settings.buyer.seed_base64.clone().unwrap_or_default(),
            electrum_url: settings.electrum_url.clone(),
            proxy: socks_port
                .map(|port| format!("127.0.0.1:{}", port))
                .unwrap_or_default(),
            proxy_port: socks_port.map(i32::from).unwrap_or(NO_PROXY_PORT),
            testnet: settings.network.is_testnet(),
        }
    }

    pub fn resume(&self, swap_id: &str, xmr_rpc_endpoint: &str, swaps_account: u32) -> ResumeRequest {
        ResumeRequest {
            seed_base64: self.seed_base64.clone(),
            swap_id: swap_id.to_string(),
            electrum_url: self.electrum_url.clone(),
            proxy: self.proxy.clone(),
            xmr_rpc_endpoint: xmr_rpc_endpoint.to_string(),
            testnet: self.testnet,
            proxy_port: self.proxy_port,
            swaps_account,
        }
    }

    pub fn cancel_and_refund(&self, swap_id: &str, root_bip32_key: &str) -> CancelAndRefundRequest {
        CancelAndRefundRequest {
            root_bip32_key: root_bip32_key.to_string(),
            swap_id: swap_id.to_string(),
            electrum_url: self.electrum_url.clone(),
            proxy: self.proxy.clone(),
            testnet: self.testnet,
        }
    }

    pub fn list_sellers(&self, rendezvous_address: &str) -> ListSellersRequest {
        ListSellersRequest {
            seed_base64: self.seed_base64.clone(),
            proxy_port: self.proxy_port,
            libp2p_rendezvous_address: rendezvous_address.to_string(),
            testnet: self.testnet,
        }
    }

    pub fn history(&self) -> GetHistoryRequest {
        GetHistoryRequest {
            testnet: self.testnet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_request_field_names() {
        let request = SwapRequest {
            uuid: "a1b2".into(),
            seed_base64: "c2VlZA==".into(),
            xmr_receive_address: "4xmr".into(),
            electrum_url: "ssl://e:50002".into(),
            proxy: String::new(),
            libp2p_peer_address: "/onion3/x:9939/p2p/peer".into(),
            xmr_rpc_endpoint: "http://127.0.0.1:5555/json_rpc".into(),
            testnet: false,
            proxy_port: NO_PROXY_PORT,
            refund_address: "bc1q".into(),
            swaps_account: 2_147_483_643,
        };
        let json = serde_json::to_value(&request).unwrap();
        for key in [
            "uuid",
            "seedBase64",
            "xmrReceiveAddress",
            "electrumUrl",
            "proxy",
            "libp2pPeerAddress",
            "xmrRpcEndpoint",
            "testnet",
            "proxyPort",
            "refundAddress",
            "swapsAccount",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(json["proxyPort"], -1);
    }

    #[test]
    fn test_params_without_proxy() {
        let params = EngineParams::from_settings(&Settings::default());
        assert_eq!(params.proxy, "");
        assert_eq!(params.proxy_port, NO_PROXY_PORT);
        assert!(!params.testnet);
    }

    #[test]
    fn test_params_with_proxy() {
        let mut settings = Settings::default();
        settings.proxy.socks_port = Some(9050);
        let params = EngineParams::from_settings(&settings);
        let request = params.resume("a1b2", "http://127.0.0.1:6000/json_rpc", 3);

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["proxy"], "127.0.0.1:9050");
        assert_eq!(json["proxyPort"], 9050);
        assert_eq!(json["swapId"], "a1b2");
        assert_eq!(json["swapsAccount"], 3);
    }

    #[test]
    fn test_history_response_tolerates_missing_txids() {
        let json = r#"{"swaps":[{"swapId":"a1","status":"BTC_LOCKED","btcLockTxid":"dead"},{"swapId":"a2","status":"NEW_THING"}]}"#;
        let response: GetHistoryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.swaps[0].status(), SwapStatus::BtcLocked);
        assert_eq!(response.swaps[0].btc_lock_txid.as_deref(), Some("dead"));
        assert_eq!(response.swaps[1].status(), SwapStatus::InvalidState);
    }

    #[test]
    fn test_sellers_response() {
        let json = r#"{"sellers":[{"multiaddr":"/ip4/1.2.3.4/tcp/9939","status":{"offline":false,"price":"0.0027","minQuantity":"0.001","maxQuantity":"0.05"}},{"multiaddr":"/ip4/5.6.7.8/tcp/9939","status":{"offline":true}}]}"#;
        let response: ListSellersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.sellers.len(), 2);
        assert_eq!(response.sellers[0].status.min_quantity.as_deref(), Some("0.001"));
        assert!(response.sellers[1].status.offline);
    }
}
