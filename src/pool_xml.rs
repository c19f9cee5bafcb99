//! Libvirt storage pool XML generation using facet-xml struct serialization.

use facet::Facet;
use facet_xml as xml;

use crate::config::StorageConfig;

// ── XML model structs ──────────────────────────────────────

#[derive(Debug, Facet)]
#[facet(rename = "pool")]
struct PoolDef {
    #[facet(xml::attribute, rename = "type")]
    kind: String,
    name: String,
    target: PoolTarget,
}

#[derive(Debug, Facet)]
struct PoolTarget {
    path: String,
}

// ── public API ─────────────────────────────────────────────

/// Generate XML for a directory-backed pool.
pub fn generate_pool_xml(storage: &StorageConfig) -> String {
    let pool = PoolDef {
        kind: "dir".into(),
        name: storage.pool.clone(),
        target: PoolTarget {
            path: storage.path.clone(),
        },
    };

    facet_xml::to_string(&pool).expect("pool XML serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_xml_is_dir_backed() {
        let xml = generate_pool_xml(&StorageConfig::default());
        assert!(xml.contains("<pool"));
        assert!(xml.contains(r#"type="dir""#));
        assert!(xml.contains("<name>default</name>"));
        assert!(xml.contains("<path>/var/lib/libvirt/images</path>"));
    }

    #[test]
    fn pool_xml_uses_configured_name() {
        let xml = generate_pool_xml(&StorageConfig {
            pool: "cluster".into(),
            path: "/srv/pools/cluster".into(),
        });
        assert!(xml.contains("<name>cluster</name>"));
        assert!(xml.contains("<path>/srv/pools/cluster</path>"));
    }
}
