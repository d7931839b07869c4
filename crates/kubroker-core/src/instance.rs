use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::params::Parameters;

/// A provisioned instance as persisted by the broker.
///
/// Created on successful provision, mutated on update, removed on
/// deprovision. `manifest` is the fully rendered text last applied to the
/// cluster, so deprovision can delete exactly what was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub service_id: String,
    pub service_name: String,
    pub plan_id: String,
    pub instance_name: String,
    pub namespace: String,
    #[serde(default)]
    pub organization_guid: String,
    #[serde(default)]
    pub space_guid: String,
    /// Caller parameters serialized as a JSON object.
    pub parameters: String,
    pub manifest: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl InstanceRecord {
    /// Decodes the stored parameters; anything but a JSON object yields an empty map.
    pub fn parsed_parameters(&self) -> Parameters {
        serde_json::from_str(&self.parameters).unwrap_or_default()
    }

    /// Marks the record as modified now.
    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(parameters: &str) -> InstanceRecord {
        let now = OffsetDateTime::now_utc();
        InstanceRecord {
            instance_id: "i1".into(),
            service_id: "s1".into(),
            service_name: "zookeeper".into(),
            plan_id: "p1".into(),
            instance_name: "app1".into(),
            namespace: "ns1".into(),
            organization_guid: String::new(),
            space_guid: String::new(),
            parameters: parameters.into(),
            manifest: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_parsed_parameters() {
        let r = record(r#"{"NAMESPACE":"ns1"}"#);
        assert_eq!(r.parsed_parameters()["NAMESPACE"], json!("ns1"));

        assert!(record("not json").parsed_parameters().is_empty());
        assert!(record("[1,2]").parsed_parameters().is_empty());
    }

    #[test]
    fn test_timestamps_serialize_as_rfc3339() {
        let r = record("{}");
        let v = serde_json::to_value(&r).unwrap();
        let created = v["created_at"].as_str().unwrap();
        assert!(OffsetDateTime::parse(created, &time::format_description::well_known::Rfc3339).is_ok());
        let back: InstanceRecord = serde_json::from_value(v).unwrap();
        assert_eq!(back.instance_id, "i1");
    }
}
