//! Metadata ingest and tool synthesis layer — reads EDMX XML (v2 or v4) and
//! produces a language-neutral [`ServiceMetadata`] (spec.md §4.1).

mod v2;
mod v4;
mod xml_util;

use std::collections::HashMap;
use std::time::SystemTime;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::MetadataError;
use crate::model::{ODataVersion, ServiceMetadata};

/// Parse a raw `$metadata` EDMX document, detecting v2 vs v4 from the root
/// `Edmx` element's `Version` attribute ("4.0"/"4.01" -> v4 branch,
/// otherwise v2 — spec.md §4.1 "Detection").
pub fn parse_metadata(xml: &[u8], service_root: &str) -> Result<ServiceMetadata, MetadataError> {
    match detect_version(xml)? {
        ODataVersion::V4 => v4::parse(xml, service_root),
        ODataVersion::V2 => v2::parse(xml, service_root),
    }
}

fn detect_version(xml: &[u8]) -> Result<ODataVersion, MetadataError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text = true;
    let mut buf = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| MetadataError::XmlParseFailed(e.to_string()))?;
        match event {
            Event::Eof => return Err(MetadataError::XmlParseFailed("no Edmx root element".into())),
            Event::Start(ref e) | Event::Empty(ref e) => {
                if xml_util::tag_local_name(e) == "Edmx" {
                    let version = xml_util::attr(e, "Version").unwrap_or_default();
                    return Ok(if version.starts_with("4.") {
                        ODataVersion::V4
                    } else {
                        ODataVersion::V2
                    });
                }
            }
            _ => {}
        }
        buf.clear();
    }
}

/// The minimal catalog returned when metadata parsing fails and the caller
/// falls back to the service document (spec.md §4.1 "Fallback"): empty
/// entity maps, version "2.0". Callers must treat an empty catalog as a
/// hard error rather than silently operating with no tools.
pub fn minimal_fallback(service_root: &str) -> ServiceMetadata {
    ServiceMetadata {
        service_root: service_root.to_string(),
        version: ODataVersion::V2,
        schema_namespace: String::new(),
        container_name: String::new(),
        entity_types: HashMap::new(),
        entity_sets: HashMap::new(),
        function_imports: HashMap::new(),
        parsed_at: SystemTime::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V2_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="1.0" xmlns:edmx="http://schemas.microsoft.com/ado/2007/06/edmx">
  <edmx:DataServices>
    <Schema Namespace="ODataDemo" xmlns="http://schemas.microsoft.com/ado/2008/09/edm">
      <EntityType Name="Product">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Int32" Nullable="false"/>
        <Property Name="Name" Type="Edm.String"/>
        <Property Name="Price" Type="Edm.Decimal"/>
        <NavigationProperty Name="Category" Relationship="ODataDemo.Product_Category_Category_Products" ToRole="Category" FromRole="Product"/>
      </EntityType>
      <EntityContainer Name="DemoService" m:IsDefaultEntityContainer="true" xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
        <EntitySet Name="Products" EntityType="ODataDemo.Product" sap:creatable="true" sap:updatable="true" sap:deletable="false" sap:searchable="true" xmlns:sap="http://www.sap.com/Protocols/SAPData"/>
        <FunctionImport Name="GetProductsByRating" ReturnType="Collection(ODataDemo.Product)" EntitySet="Products" m:HttpMethod="GET">
          <Parameter Name="rating" Type="Edm.Int32" Mode="In"/>
        </FunctionImport>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    const V4_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<edmx:Edmx Version="4.0" xmlns:edmx="http://docs.oasis-open.org/odata/ns/edmx">
  <edmx:DataServices>
    <Schema Namespace="ODataDemo" xmlns="http://docs.oasis-open.org/odata/ns/edm">
      <EntityType Name="Product">
        <Key><PropertyRef Name="ID"/></Key>
        <Property Name="ID" Type="Edm.Int32" Nullable="false"/>
        <Property Name="Name" Type="Edm.String"/>
        <Property Name="ReleaseDate" Type="Edm.Date"/>
      </EntityType>
      <Function Name="GetTopProduct" IsBound="false">
        <Parameter Name="count" Type="Edm.Int32"/>
        <ReturnType Type="Collection(ODataDemo.Product)"/>
      </Function>
      <Action Name="Discontinue" IsBound="false">
        <Parameter Name="id" Type="Edm.Int32"/>
      </Action>
      <EntityContainer Name="DemoService">
        <EntitySet Name="Products" EntityType="ODataDemo.Product"/>
        <FunctionImport Name="GetTopProduct" Function="ODataDemo.GetTopProduct" EntitySet="Products"/>
        <ActionImport Name="Discontinue" Action="ODataDemo.Discontinue"/>
      </EntityContainer>
    </Schema>
  </edmx:DataServices>
</edmx:Edmx>"#;

    #[test]
    fn detects_v2_by_default() {
        assert_eq!(detect_version(V2_XML.as_bytes()).unwrap(), ODataVersion::V2);
    }

    #[test]
    fn detects_v4_by_version_attribute() {
        assert_eq!(detect_version(V4_XML.as_bytes()).unwrap(), ODataVersion::V4);
    }

    #[test]
    fn v2_parses_entity_type_with_key_and_nav_property() {
        let meta = parse_metadata(V2_XML.as_bytes(), "https://example.com/svc/").unwrap();
        assert_eq!(meta.version, ODataVersion::V2);
        let product = meta.entity_types.get("Product").unwrap();
        assert_eq!(product.key_properties, vec!["ID".to_string()]);
        assert!(product.property("ID").unwrap().is_key);
        assert!(!product.property("Name").unwrap().is_key);
        assert_eq!(product.navigation_properties.len(), 1);
    }

    #[test]
    fn v2_entity_set_reads_sap_capability_flags() {
        let meta = parse_metadata(V2_XML.as_bytes(), "https://example.com/svc/").unwrap();
        let set = meta.entity_sets.get("Products").unwrap();
        assert!(set.creatable);
        assert!(set.updatable);
        assert!(!set.deletable);
        assert!(set.searchable);
    }

    #[test]
    fn v2_function_import_defaults_to_get_with_in_parameter() {
        let meta = parse_metadata(V2_XML.as_bytes(), "https://example.com/svc/").unwrap();
        let fi = meta.function_imports.get("GetProductsByRating").unwrap();
        assert_eq!(fi.http_method, crate::model::HttpMethod::Get);
        assert_eq!(fi.parameters.len(), 1);
        assert_eq!(fi.parameters[0].direction, crate::model::ParameterDirection::In);
    }

    #[test]
    fn v4_entity_set_capabilities_forced_true() {
        let meta = parse_metadata(V4_XML.as_bytes(), "https://example.com/svc/").unwrap();
        let set = meta.entity_sets.get("Products").unwrap();
        assert!(set.creatable && set.updatable && set.deletable && set.searchable);
    }

    #[test]
    fn v4_function_import_is_get_action_import_is_post() {
        let meta = parse_metadata(V4_XML.as_bytes(), "https://example.com/svc/").unwrap();
        let func = meta.function_imports.get("GetTopProduct").unwrap();
        assert_eq!(func.http_method, crate::model::HttpMethod::Get);
        assert!(!func.is_action);

        let action = meta.function_imports.get("Discontinue").unwrap();
        assert_eq!(action.http_method, crate::model::HttpMethod::Post);
        assert!(action.is_action);
    }

    #[test]
    fn v4_accepts_new_primitive_types() {
        let meta = parse_metadata(V4_XML.as_bytes(), "https://example.com/svc/").unwrap();
        let product = meta.entity_types.get("Product").unwrap();
        assert_eq!(product.property("ReleaseDate").unwrap().odata_type, "Edm.Date");
    }

    #[test]
    fn minimal_fallback_has_empty_catalogs() {
        let meta = minimal_fallback("https://example.com/svc/");
        assert!(meta.entity_types.is_empty());
        assert!(meta.entity_sets.is_empty());
        assert_eq!(meta.version, ODataVersion::V2);
    }
}
