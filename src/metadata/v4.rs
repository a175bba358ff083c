//! OData v4 EDMX parsing (spec.md §4.1 "v4 parsing").
//!
//! Unlike v2, a v4 document may carry multiple `Schema` elements. Entity
//! types are collected from all of them; the first schema that contains an
//! `EntityContainer` is treated as the "main" schema for entity-set and
//! function/action-import purposes. Entity-set capability flags are forced
//! true (v4 capability vocabulary annotations are not read). Function
//! imports reference a named `Function` (GET); action imports reference a
//! named `Action` (POST); a parameter named `bindingParameter` is dropped.

use std::collections::HashMap;
use std::time::SystemTime;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::MetadataError;
use crate::model::{
    EntitySet, EntityType, FunctionImport, FunctionParameter, HttpMethod, NavigationProperty,
    ODataVersion, ParameterDirection, Property, PropertyFacets, ServiceMetadata,
};

use super::xml_util::{attr, tag_local_name, normalize_type_name};

#[derive(Default)]
struct EntityTypeBuilder {
    name: String,
    properties: Vec<Property>,
    key_properties: Vec<String>,
    navigation_properties: Vec<NavigationProperty>,
    in_key: bool,
}

#[derive(Default, Clone)]
struct FunctionDef {
    is_bound: bool,
    is_action: bool,
    return_type: Option<String>,
    parameters: Vec<FunctionParameter>,
}

enum ImportRef {
    Function { name: String, target: String },
    Action { name: String, target: String },
}

#[derive(Default)]
struct ContainerInfo {
    name: String,
    entity_sets: HashMap<String, EntitySet>,
    imports: Vec<ImportRef>,
}

pub fn parse(xml: &[u8], service_root: &str) -> Result<ServiceMetadata, MetadataError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text = true;
    let mut buf = Vec::new();

    let mut entity_types: HashMap<String, EntityType> = HashMap::new();
    let mut function_defs: HashMap<String, FunctionDef> = HashMap::new();
    let mut main_container: Option<ContainerInfo> = None;
    let mut main_namespace = String::new();

    let mut current_namespace = String::new();
    let mut current_entity: Option<EntityTypeBuilder> = None;
    let mut current_function_qname: Option<String> = None;
    let mut in_container = false;
    let mut container_done = false;

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
                        current_namespace = attr(e, "Namespace").unwrap_or_default();
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
                            let odata_type =
                                normalize_type_name(&attr(e, "Type").unwrap_or_default());
                            let nullable = attr(e, "Nullable")
                                .map(|v| !v.eq_ignore_ascii_case("false"))
                                .unwrap_or(true);
                            let facets = PropertyFacets {
                                max_length: attr(e, "MaxLength").and_then(|v| v.parse().ok()),
                                precision: attr(e, "Precision").and_then(|v| v.parse().ok()),
                                scale: attr(e, "Scale").and_then(|v| v.parse().ok()),
                            };
                            ent.properties.push(Property {
                                name,
                                odata_type,
                                nullable,
                                is_key: false,
                                description: None,
                                facets,
                            });
                        }
                    }
                    "NavigationProperty" => {
                        if let Some(ent) = current_entity.as_mut() {
                            ent.navigation_properties.push(NavigationProperty {
                                name: attr(e, "Name").unwrap_or_default(),
                                relationship: None,
                                to_role: None,
                                from_role: None,
                            });
                        }
                    }
                    "Function" | "Action" => {
                        let is_action = local == "Action";
                        let name = attr(e, "Name").unwrap_or_default();
                        let qname = format!("{}.{}", current_namespace, name);
                        let def = FunctionDef {
                            is_bound: attr(e, "IsBound")
                                .map(|v| v.eq_ignore_ascii_case("true"))
                                .unwrap_or(false),
                            is_action,
                            return_type: None,
                            parameters: Vec::new(),
                        };
                        if is_empty {
                            function_defs.insert(qname, def);
                        } else {
                            function_defs.insert(qname.clone(), def);
                            current_function_qname = Some(qname);
                        }
                    }
                    "Parameter" => {
                        if let Some(qname) = current_function_qname.as_ref() {
                            let name = attr(e, "Name").unwrap_or_default();
                            if name == "bindingParameter" {
                                // dropped per spec.md §4.1
                            } else if let Some(def) = function_defs.get_mut(qname) {
                                def.parameters.push(FunctionParameter {
                                    name,
                                    odata_type: normalize_type_name(
                                        &attr(e, "Type").unwrap_or_default(),
                                    ),
                                    direction: ParameterDirection::In,
                                    nullable: attr(e, "Nullable")
                                        .map(|v| !v.eq_ignore_ascii_case("false"))
                                        .unwrap_or(true),
                                });
                            }
                        }
                    }
                    "ReturnType" => {
                        if let Some(qname) = current_function_qname.as_ref() {
                            if let Some(def) = function_defs.get_mut(qname) {
                                def.return_type =
                                    attr(e, "Type").map(|t| normalize_type_name(&t));
                            }
                        }
                    }
                    "EntityContainer" => {
                        if !container_done {
                            in_container = true;
                            main_namespace = current_namespace.clone();
                            main_container = Some(ContainerInfo {
                                name: attr(e, "Name").unwrap_or_default(),
                                ..Default::default()
                            });
                        } else {
                            in_container = false;
                        }
                    }
                    "EntitySet" if in_container => {
                        if let Some(container) = main_container.as_mut() {
                            let name = attr(e, "Name").unwrap_or_default();
                            let entity_type =
                                normalize_type_name(&attr(e, "EntityType").unwrap_or_default());
                            let set = EntitySet::v4_defaults(name.clone(), entity_type);
                            container.entity_sets.insert(name, set);
                        }
                    }
                    "FunctionImport" if in_container => {
                        if let Some(container) = main_container.as_mut() {
                            container.imports.push(ImportRef::Function {
                                name: attr(e, "Name").unwrap_or_default(),
                                target: attr(e, "Function").unwrap_or_default(),
                            });
                        }
                    }
                    "ActionImport" if in_container => {
                        if let Some(container) = main_container.as_mut() {
                            container.imports.push(ImportRef::Action {
                                name: attr(e, "Name").unwrap_or_default(),
                                target: attr(e, "Action").unwrap_or_default(),
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
                    "Function" | "Action" => {
                        current_function_qname = None;
                    }
                    "EntityContainer" => {
                        if in_container {
                            container_done = true;
                        }
                        in_container = false;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
        buf.clear();
    }

    let container = main_container.ok_or(MetadataError::NoContainer)?;

    let mut function_imports = HashMap::new();
    for import in container.imports {
        let (name, target, is_action) = match import {
            ImportRef::Function { name, target } => (name, target, false),
            ImportRef::Action { name, target } => (name, target, true),
        };
        let def = function_defs.get(&target).cloned().unwrap_or_default();
        function_imports.insert(
            name.clone(),
            FunctionImport {
                name,
                http_method: if is_action || def.is_action {
                    HttpMethod::Post
                } else {
                    HttpMethod::Get
                },
                return_type: def.return_type,
                parameters: def.parameters,
                is_bound: def.is_bound,
                is_action: is_action || def.is_action,
            },
        );
    }

    for set in container.entity_sets.values() {
        if !entity_types.contains_key(&set.entity_type) {
            return Err(MetadataError::DanglingEntityType(
                set.name.clone(),
                set.entity_type.clone(),
            ));
        }
    }

    Ok(ServiceMetadata {
        service_root: service_root.to_string(),
        version: ODataVersion::V4,
        schema_namespace: main_namespace,
        container_name: container.name,
        entity_types,
        entity_sets: container.entity_sets,
        function_imports,
        parsed_at: SystemTime::now(),
    })
}
