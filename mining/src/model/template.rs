use serde::{Deserialize, Serialize};

/// A `getblocktemplate` result as the daemon reports it. Fields are kept raw
/// and optional; the job builder decides which absences are fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockTemplate {
    pub version: Option<u32>,
    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: Option<String>,
    pub transactions: Vec<TemplateTransaction>,
    #[serde(rename = "coinbasevalue")]
    pub coinbase_value: Option<u64>,
    #[serde(rename = "coinbasetxn")]
    pub coinbase_txn: Option<CoinbaseTxn>,
    pub target: Option<String>,
    #[serde(rename = "curtime")]
    pub cur_time: Option<u32>,
    pub bits: Option<String>,
    pub height: Option<u64>,
    pub default_witness_commitment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateTransaction {
    /// Serialized transaction, hex
    pub data: String,
    /// Transaction id in display byte order
    pub txid: Option<String>,
    /// Witness transaction id in display byte order
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinbaseTxn {
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_daemon_result() {
        let json = r#"{
            "version": 536870912,
            "rules": ["csv", "!segwit", "taproot"],
            "previousblockhash": "0f9188f13cb7b2c71f2a335e3a4fc328bf5beb436012afca590b1a11466e2206",
            "transactions": [{"data": "0100", "txid": "aa", "hash": "bb", "fee": 100, "weight": 400}],
            "coinbasevalue": 5000000000,
            "target": "7fffff0000000000000000000000000000000000000000000000000000000000",
            "curtime": 1700000000,
            "bits": "207fffff",
            "height": 1
        }"#;
        let template: BlockTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(template.version, Some(0x2000_0000));
        assert_eq!(template.transactions.len(), 1);
        assert_eq!(template.transactions[0].txid.as_deref(), Some("aa"));
        assert_eq!(template.coinbase_txn, None);
        assert_eq!(template.default_witness_commitment, None);
        assert_eq!(template.height, Some(1));
    }
}
