//! Response Payload Schema
//!
//! Purpose:
//!     Fixed-schema encoding of derived simulation parameters into the opaque
//!     byte payload passed to the response contract's `executeBytes(bytes)`.
//!
//! Created: 2026-10-03
//!
//! Notes:
//!     - The schema is validated once at startup against the argument types the
//!       response contract decodes; a mismatch is a ConfigError.
//!     - Encoding is standard ABI parameter encoding of a flat tuple, i.e.
//!       `abi.decode(data, (address, address, uint256))` on the contract side.

use crate::error::{ConfigError, PayloadError};
use crate::types::{params, SimulationResult};
use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::Bytes;
use serde::Deserialize;

/// One `[[response.payload]]` entry from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchemaEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

impl SchemaEntry {
    pub fn new(name: &str, ty: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
        }
    }
}

/// Type of each parameter the simulator is able to derive.
fn derivable_parameter_type(name: &str) -> Option<DynSolType> {
    match name {
        params::COLLATERAL | params::USER | params::POOL | params::SENDER | params::RECIPIENT => {
            Some(DynSolType::Address)
        }
        params::DEBT_TO_COVER | params::VALUE => Some(DynSolType::Uint(256)),
        _ => None,
    }
}

/// Validated, ordered payload layout.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadSchema {
    fields: Vec<(String, DynSolType)>,
}

impl PayloadSchema {
    /// Build and validate a schema against the response contract's argument types.
    pub fn new(entries: Vec<SchemaEntry>, contract_argument_types: &[String]) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::SchemaMismatch("payload schema is empty".to_string()));
        }

        let mut fields = Vec::with_capacity(entries.len());
        for entry in entries {
            let ty = DynSolType::parse(&entry.ty).map_err(|e| {
                ConfigError::SchemaMismatch(format!("'{}' has invalid type '{}': {}", entry.name, entry.ty, e))
            })?;
            let derivable = derivable_parameter_type(&entry.name).ok_or_else(|| {
                ConfigError::SchemaMismatch(format!("'{}' is not a derivable parameter", entry.name))
            })?;
            if derivable != ty {
                return Err(ConfigError::SchemaMismatch(format!(
                    "'{}' is declared {} but is derived as {}",
                    entry.name,
                    ty.sol_type_name(),
                    derivable.sol_type_name()
                )));
            }
            fields.push((entry.name, ty));
        }

        let contract_types = contract_argument_types
            .iter()
            .map(|raw| {
                DynSolType::parse(raw).map_err(|e| {
                    ConfigError::SchemaMismatch(format!("contract argument type '{}' invalid: {}", raw, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let schema_types: Vec<&DynSolType> = fields.iter().map(|(_, ty)| ty).collect();
        let contract_refs: Vec<&DynSolType> = contract_types.iter().collect();
        if schema_types != contract_refs {
            return Err(ConfigError::SchemaMismatch(format!(
                "schema ({}) does not match contract arguments ({})",
                join_types(schema_types.iter().copied()),
                join_types(contract_types.iter()),
            )));
        }

        Ok(Self { fields })
    }

    /// The `(collateral, user, debtToCover)` layout used by the stock response contract.
    pub fn liquidation_default() -> Self {
        Self {
            fields: vec![
                (params::COLLATERAL.to_string(), DynSolType::Address),
                (params::USER.to_string(), DynSolType::Address),
                (params::DEBT_TO_COVER.to_string(), DynSolType::Uint(256)),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Encode derived parameters in schema order.
    pub fn encode(&self, result: &SimulationResult) -> Result<Bytes, PayloadError> {
        let mut values = Vec::with_capacity(self.fields.len());
        for (name, ty) in &self.fields {
            let value = result
                .param(name)
                .ok_or_else(|| PayloadError::MissingParameter(name.clone()))?;
            if !ty.matches(value) {
                return Err(PayloadError::TypeMismatch {
                    name: name.clone(),
                    expected: ty.sol_type_name().into_owned(),
                });
            }
            values.push(value.clone());
        }
        Ok(Bytes::from(DynSolValue::Tuple(values).abi_encode_params()))
    }
}

fn join_types<'a>(types: impl Iterator<Item = &'a DynSolType>) -> String {
    types
        .map(|t| t.sol_type_name().into_owned())
        .collect::<Vec<_>>()
        .join(",")
}
