use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// Reply of the appliance info URL
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ApplianceInfo {
    #[serde(rename = "mgmtURL")]
    pub mgmt_url: String,

    #[serde(rename = "dataRetrievalURL")]
    pub data_retrieval_url: String,

    // Version strings, identity, cluster peers...
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ApplianceInfo {
    /// Every key of the reply, in key order
    pub fn entries(&self) -> Vec<(&str, String)> {
        let mut entries = vec![
            ("dataRetrievalURL", self.data_retrieval_url.clone()),
            ("mgmtURL", self.mgmt_url.clone()),
        ];
        for (k, v) in self.extra.iter() {
            let v = match v {
                Value::String(s) => s.clone(),
                x => x.to_string(),
            };
            entries.push((k.as_str(), v));
        }
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn search_url(&self) -> String {
        format!("{}/getAllPVs", self.mgmt_url.trim_end_matches('/'))
    }

    pub fn data_url(&self) -> String {
        format!("{}/data/getData.raw", self.data_retrieval_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod test_info {
    use super::*;

    const REPLY: &str = r#"{
        "identity": "appliance0",
        "version": "Archiver Appliance Version 0.0.1",
        "mgmtURL": "http://localhost:17665/mgmt/bpl",
        "dataRetrievalURL": "http://localhost:17665/retrieval/",
        "clusterInetPort": 16670
    }"#;

    #[test]
    fn parse_reply() {
        let info: ApplianceInfo = serde_json::from_str(REPLY).unwrap();

        assert_eq!(info.mgmt_url, "http://localhost:17665/mgmt/bpl");
        assert_eq!(info.extra.len(), 3);
        assert_eq!(info.search_url(), "http://localhost:17665/mgmt/bpl/getAllPVs");
        assert_eq!(
            info.data_url(),
            "http://localhost:17665/retrieval/data/getData.raw"
        );
    }

    #[test]
    fn entries_sorted() {
        let info: ApplianceInfo = serde_json::from_str(REPLY).unwrap();
        let keys: Vec<&str> = info.entries().iter().map(|x| x.0).collect();

        assert_eq!(
            keys,
            vec![
                "clusterInetPort",
                "dataRetrievalURL",
                "identity",
                "mgmtURL",
                "version"
            ]
        );
        assert_eq!(info.entries()[0].1, "16670");
    }

    #[test]
    fn missing_urls() {
        assert!(serde_json::from_str::<ApplianceInfo>(r#"{"identity": "x"}"#).is_err());
    }
}
