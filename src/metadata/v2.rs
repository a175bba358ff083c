//! OData v2 EDMX parsing (spec.md §4.1 "v2 parsing").
//!
//! Walks the single `Schema` element: entity types in declaration order,
//! `<Key><PropertyRef/></Key>` marking key properties, `Nullable` defaulting
//! true, navigation properties carrying `Relationship`/`ToRole`/`FromRole`.
//! The first `EntityContainer` supplies entity sets (SAP capability
//! annotations, default true except `searchable`) and function imports
//! (`Mode` defaults to `In`, HTTP method defaults to `GET`).

use std::collections::HashMap;
use std::time::SystemTime;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::MetadataError;
use crate::model::{
    EntitySet, EntityType, FunctionImport, FunctionParameter, HttpMethod, NavigationProperty,
    ODataVersion, ParameterDirection, Property, PropertyFacets, ServiceMetadata,
};

use super::xml_util::{attr, attr_bool, tag_local_name};

#[derive(Default)]
struct EntityTypeBuilder {
    name: String,
    properties: Vec<Property>,
    key_properties: Vec<String>,
    navigation_properties: Vec<NavigationProperty>,
    in_key: bool,
}

pub fn parse(xml: &[u8], service_root: &str) -> Result<ServiceMetadata, MetadataError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text = true;

    let mut buf = Vec::new();

    let mut schema_namespace = String::new();
    let mut container_name = String::new();
    let mut entity_types: HashMap<String, EntityType> = HashMap::new();
    let mut entity_sets: HashMap<String, EntitySet> = HashMap::new();
    let mut function_imports: HashMap<String, FunctionImport> = HashMap::new();

    let mut current_entity: Option<EntityTypeBuilder> = None;
    let mut current_function: Option<FunctionImport> = None;
    let mut in_container = false;
    let mut container_seen = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| MetadataError::XmlParseFailed(e.to_string()))?;

        match event {
            Event::Eof => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = tag_local_name(e);
                match local.as_str() {
                    "Schema" => {
                        if schema_namespace.is_empty() {
                            schema_namespace = attr(e, "Namespace").unwrap_or_default();
                        }
                    }
                    "EntityType" => {
                        current_entity = Some(EntityTypeBuilder {
                            name: attr(e, "Name").unwrap_or_default(),
                            ..Default::default()
                        });
                    }
                    "Key" => {
                        if let Some(ent) = current_entity.as_mut() {
                            ent.in_key = true;
                        }
                    }
                    "PropertyRef" => {
                        if let Some(ent) = current_entity.as_mut() {
                            if ent.in_key {
                                if let Some(name) = attr(e, "Name") {
                                    ent.key_properties.push(name);
                                }
                            }
                        }
                    }
                    "Property" => {
                        if let Some(ent) = current_entity.as_mut() {
                            let name = attr(e, "Name").unwrap_or_default();
                            let odata_type = attr(e, "Type").unwrap_or_default();
                            let nullable = attr(e, "Nullable")
                                .map(|v| !v.eq_ignore_ascii_case("false"))
                                .unwrap_or(true);
                            let facets = PropertyFacets {
                                max_length: attr(e, "MaxLength").and_then(|v| v.parse().ok()),
                                precision: attr(e, "Precision").and_then(|v| v.parse().ok()),
                                scale: attr(e, "Scale").and_then(|v| v.parse().ok()),
                            };
                            let description = attr(e, "sap:label").or_else(|| attr(e, "label"));
                            ent.properties.push(Property {
                                name,
                                odata_type,
                                nullable,
                                is_key: false, // fixed up once Key block is fully read
                                description,
                                facets,
                            });
                        }
                    }
                    "NavigationProperty" => {
                        if let Some(ent) = current_entity.as_mut() {
                            ent.navigation_properties.push(NavigationProperty {
                                name: attr(e, "Name").unwrap_or_default(),
                                relationship: attr(e, "Relationship"),
                                to_role: attr(e, "ToRole"),
                                from_role: attr(e, "FromRole"),
                            });
                        }
                    }
                    "EntityContainer" => {
                        if !container_seen {
                            container_seen = true;
                            in_container = true;
                            container_name = attr(e, "Name").unwrap_or_default();
                        } else {
                            in_container = false;
                        }
                    }
                    "EntitySet" if in_container => {
                        let name = attr(e, "Name").unwrap_or_default();
                        let entity_type = unqualify(&attr(e, "EntityType").unwrap_or_default());
                        let mut set = EntitySet::v2_defaults(name.clone(), entity_type);
                        set.creatable = attr_bool(e, "creatable", true);
                        set.updatable = attr_bool(e, "updatable", true);
                        set.deletable = attr_bool(e, "deletable", true);
                        set.searchable = attr_bool(e, "searchable", false);
                        set.pageable = attr_bool(e, "pageable", true);
                        entity_sets.insert(name, set);
                    }
                    "FunctionImport" if in_container => {
                        let name = attr(e, "Name").unwrap_or_default();
                        let http_method = match attr(e, "HttpMethod").as_deref() {
                            Some("POST") => HttpMethod::Post,
                            _ => HttpMethod::Get,
                        };
                        let return_type = attr(e, "ReturnType");
                        let fi = FunctionImport {
                            name: name.clone(),
                            http_method,
                            return_type,
                            parameters: Vec::new(),
                            is_bound: false,
                            is_action: false,
                        };
                        if is_empty {
                            function_imports.insert(name, fi);
                        } else {
                            current_function = Some(fi);
                        }
                    }
                    "Parameter" => {
                        if let Some(f) = current_function.as_mut() {
                            let direction = match attr(e, "Mode").as_deref() {
                                Some("Out") => ParameterDirection::Out,
                                Some("InOut") => ParameterDirection::InOut,
                                _ => ParameterDirection::In,
                            };
                            f.parameters.push(FunctionParameter {
                                name: attr(e, "Name").unwrap_or_default(),
                                odata_type: attr(e, "Type").unwrap_or_default(),
                                direction,
                                nullable: attr(e, "Nullable")
                                    .map(|v| !v.eq_ignore_ascii_case("false"))
                                    .unwrap_or(true),
                            });
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                let local = tag_local_name(&e);
                match local.as_str() {
                    "Key" => {
                        if let Some(ent) = current_entity.as_mut() {
                            ent.in_key = false;
                        }
                    }
                    "EntityType" => {
                        if let Some(mut ent) = current_entity.take() {
                            for p in ent.properties.iter_mut() {
                                p.is_key = ent.key_properties.iter().any(|k| k == &p.name);
                            }
                            entity_types.insert(
                                ent.name.clone(),
                                EntityType {
                                    name: ent.name,
                                    properties: ent.properties,
                                    key_properties: ent.key_properties,
                                    navigation_properties: ent.navigation_properties,
                                },
                            );
                        }
                    }
                    "FunctionImport" => {
                        if let Some(f) = current_function.take() {
                            function_imports.insert(f.name.clone(), f);
                        }
                    }
                    "EntityContainer" => {
                        in_container = false;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        buf.clear();
    }

    if container_name.is_empty() && entity_sets.is_empty() {
        return Err(MetadataError::NoContainer);
    }

    for set in entity_sets.values() {
        if !entity_types.contains_key(&set.entity_type) {
            return Err(MetadataError::DanglingEntityType(
                set.name.clone(),
                set.entity_type.clone(),
            ));
        }
    }

    Ok(ServiceMetadata {
        service_root: service_root.to_string(),
        version: ODataVersion::V2,
        schema_namespace,
        container_name,
        entity_types,
        entity_sets,
        function_imports,
        parsed_at: SystemTime::now(),
    })
}

fn unqualify(type_name: &str) -> String {
    type_name.rsplit('.').next().unwrap_or(type_name).to_string()
}
