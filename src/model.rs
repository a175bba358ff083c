//! Language-neutral model of an OData service, produced once by the
//! metadata parser and consumed read-only by everything downstream
//! (spec.md §3).

use std::collections::HashMap;
use std::time::SystemTime;

/// OData protocol version a service speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ODataVersion {
    V2,
    V4,
}

impl ODataVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            ODataVersion::V2 => "2.0",
            ODataVersion::V4 => "4.0",
        }
    }

    pub fn is_v4(self) -> bool {
        matches!(self, ODataVersion::V4)
    }
}

/// Parsed, immutable description of an OData service.
///
/// Invariant: every `EntitySet::entity_type` is a key in `entity_types`.
#[derive(Debug, Clone)]
pub struct ServiceMetadata {
    pub service_root: String,
    pub version: ODataVersion,
    pub schema_namespace: String,
    pub container_name: String,
    pub entity_types: HashMap<String, EntityType>,
    pub entity_sets: HashMap<String, EntitySet>,
    pub function_imports: HashMap<String, FunctionImport>,
    pub parsed_at: SystemTime,
}

impl ServiceMetadata {
    /// Entity sets in alphabetical order — the order the tool synthesizer
    /// must iterate in to get deterministic `tools/list` output.
    pub fn entity_set_names_sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entity_sets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn entity_type_for_set(&self, set_name: &str) -> Option<&EntityType> {
        let set = self.entity_sets.get(set_name)?;
        self.entity_types.get(&set.entity_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    /// Raw OData type string, e.g. `Edm.Int32`, `Collection(Edm.String)`.
    pub odata_type: String,
    pub nullable: bool,
    pub is_key: bool,
    pub description: Option<String>,
    pub facets: PropertyFacets,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyFacets {
    pub max_length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct NavigationProperty {
    pub name: String,
    pub relationship: Option<String>,
    pub to_role: Option<String>,
    pub from_role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    /// Declaration order, preserved from the EDMX document.
    pub properties: Vec<Property>,
    /// Names of properties making up the key, in declaration order.
    pub key_properties: Vec<String>,
    pub navigation_properties: Vec<NavigationProperty>,
}

impl EntityType {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn is_key_property(&self, name: &str) -> bool {
        self.key_properties.iter().any(|k| k == name)
    }
}

#[derive(Debug, Clone)]
pub struct EntitySet {
    pub name: String,
    /// Unqualified entity type name.
    pub entity_type: String,
    pub creatable: bool,
    pub updatable: bool,
    pub deletable: bool,
    pub searchable: bool,
    pub pageable: bool,
}

impl EntitySet {
    /// v2 SAP annotation defaults: everything true except `searchable`.
    pub fn v2_defaults(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            creatable: true,
            updatable: true,
            deletable: true,
            searchable: false,
            pageable: true,
        }
    }

    /// v4: no per-set capability metadata is read; everything defaults true.
    pub fn v4_defaults(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            creatable: true,
            updatable: true,
            deletable: true,
            searchable: true,
            pageable: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterDirection {
    In,
    InOut,
    Out,
}

#[derive(Debug, Clone)]
pub struct FunctionParameter {
    pub name: String,
    pub odata_type: String,
    pub direction: ParameterDirection,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionImport {
    pub name: String,
    pub http_method: HttpMethod,
    pub return_type: Option<String>,
    pub parameters: Vec<FunctionParameter>,
    pub is_bound: bool,
    /// v4 only: true for actions (side-effecting, POST), false for functions.
    pub is_action: bool,
}

impl FunctionImport {
    /// A modifying function import: non-GET method or a v4 action.
    pub fn is_modifying(&self) -> bool {
        self.http_method == HttpMethod::Post || self.is_action
    }
}

/// The operation an eager-mode tool exposes (spec.md §4.4 "eager mode").
/// Lazy-mode generic tools carry the same tags but take the bound name
/// (`entity_set`/`function_name`) as a call-time argument instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Filter,
    Count,
    Get,
    Search,
    Create,
    Update,
    Delete,
    Function,
    ServiceInfo,
}

impl OperationKind {
    /// Single-letter code used by `enable_ops`/`disable_ops` (spec.md §4.4):
    /// C, U, D, G=get, F=filter+count, S=search, A=actions/functions.
    /// `R` expands to `S ∪ F ∪ G` and is handled by the caller, not here.
    pub fn op_code(self) -> char {
        match self {
            OperationKind::Create => 'C',
            OperationKind::Update => 'U',
            OperationKind::Delete => 'D',
            OperationKind::Get => 'G',
            OperationKind::Filter | OperationKind::Count => 'F',
            OperationKind::Search => 'S',
            OperationKind::Function => 'A',
            OperationKind::ServiceInfo => 'I',
        }
    }

    pub fn is_modifying(self) -> bool {
        matches!(self, OperationKind::Create | OperationKind::Update | OperationKind::Delete)
    }
}

/// Runtime tool-registry entry (spec.md §3 "ToolInfo"). Produced by the
/// tool synthesizer, stored by the MCP server both in a name->entry map
/// and an insertion-ordered sequence (spec.md §3 "Ownership").
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub operation: OperationKind,
    pub entity_set: Option<String>,
    pub function: Option<String>,
    pub input_schema: serde_json::Value,
}
