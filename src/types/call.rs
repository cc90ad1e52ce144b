//! Normalized call descriptor
//!
//! Domain services hand us ABIs in two shapes: lists of human-readable
//! signatures (`"function approve(address spender, uint256 amount)"`) and
//! structured JSON ABIs. [`CallSpec::encode`] resolves either shape into a
//! [`ContractCall`], so the rest of the engine never branches on input shape.

use alloy::dyn_abi::{DynSolType, DynSolValue, JsonAbiExt};
use alloy::json_abi::{Function, JsonAbi, Param};
use alloy::primitives::{Address, Bytes, U256};
use serde_json::Value as JsonValue;

/// Errors raised while normalizing a call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    #[error("invalid function signature '{0}'")]
    InvalidSignature(String),
    #[error("function '{0}' not found in ABI")]
    FunctionNotFound(String),
    #[error("no overload of '{name}' accepts {args} arguments")]
    NoMatchingOverload { name: String, args: usize },
    #[error("failed to encode arguments for '{name}': {reason}")]
    Encoding { name: String, reason: String },
}

/// ABI supplied by a domain service
#[derive(Debug, Clone)]
pub enum AbiSource {
    /// Human-readable signatures
    HumanReadable(Vec<String>),
    /// Structured JSON ABI
    Json(JsonAbi),
}

impl AbiSource {
    /// Build from human-readable signatures
    pub fn human_readable<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::HumanReadable(signatures.into_iter().map(Into::into).collect())
    }

    /// Parse a JSON ABI string
    pub fn json(abi: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::Json(serde_json::from_str(abi)?))
    }

    /// All functions named `name`
    fn functions_named(&self, name: &str) -> Result<Vec<Function>, AbiError> {
        match self {
            Self::HumanReadable(signatures) => {
                let mut functions = Vec::new();
                for signature in signatures {
                    let trimmed = signature.trim();
                    // Events, errors and constructors can share the list
                    if ["event ", "error ", "constructor", "fallback", "receive"]
                        .iter()
                        .any(|prefix| trimmed.starts_with(prefix))
                    {
                        continue;
                    }
                    let function = Function::parse(trimmed)
                        .map_err(|_| AbiError::InvalidSignature(signature.clone()))?;
                    if function.name == name {
                        functions.push(function);
                    }
                }
                Ok(functions)
            }
            Self::Json(abi) => Ok(abi.function(name).cloned().unwrap_or_default()),
        }
    }
}

/// A contract call as supplied by a domain service
#[derive(Debug, Clone)]
pub struct CallSpec {
    /// Target contract
    pub contract_address: Address,
    /// ABI describing the target
    pub abi: AbiSource,
    /// Function to call
    pub function_name: String,
    /// Arguments as JSON values
    pub args: Vec<JsonValue>,
    /// Native value in wei
    pub native_value: U256,
}

impl CallSpec {
    /// Create a call spec with no native value
    pub fn new(
        contract_address: Address,
        abi: AbiSource,
        function_name: impl Into<String>,
        args: Vec<JsonValue>,
    ) -> Self {
        Self {
            contract_address,
            abi,
            function_name: function_name.into(),
            args,
            native_value: U256::ZERO,
        }
    }

    /// Set the native value
    pub fn with_value(mut self, value: U256) -> Self {
        self.native_value = value;
        self
    }

    /// Resolve the function and encode the calldata
    pub fn encode(&self) -> Result<ContractCall, AbiError> {
        let candidates: Vec<Function> = self
            .abi
            .functions_named(&self.function_name)?
            .into_iter()
            .filter(|f| f.inputs.len() == self.args.len())
            .collect();

        if candidates.is_empty() {
            // Distinguish "missing" from "wrong arity"
            return if self.abi.functions_named(&self.function_name)?.is_empty() {
                Err(AbiError::FunctionNotFound(self.function_name.clone()))
            } else {
                Err(AbiError::NoMatchingOverload {
                    name: self.function_name.clone(),
                    args: self.args.len(),
                })
            };
        }

        let mut last_error = None;
        for function in candidates {
            match encode_arguments(&function, &self.args) {
                Ok(data) => {
                    return Ok(ContractCall {
                        to: self.contract_address,
                        data: data.into(),
                        value: self.native_value,
                        function: Some(function.name.clone()),
                    })
                }
                Err(reason) => last_error = Some(reason),
            }
        }

        Err(AbiError::Encoding {
            name: self.function_name.clone(),
            reason: last_error.unwrap_or_default(),
        })
    }
}

fn encode_arguments(function: &Function, args: &[JsonValue]) -> Result<Vec<u8>, String> {
    let values = json_to_sol(args, &function.inputs)?;
    function
        .abi_encode_input(&values)
        .map_err(|e| format!("Failed to encode function call: {e}"))
}

fn json_to_sol(values: &[JsonValue], params: &[Param]) -> Result<Vec<DynSolValue>, String> {
    if values.len() != params.len() {
        return Err(format!(
            "Parameter count mismatch: expected {}, got {}",
            params.len(),
            values.len()
        ));
    }

    let mut parsed = Vec::with_capacity(values.len());
    for (value, param) in values.iter().zip(params) {
        let sol_type: DynSolType = param
            .selector_type()
            .parse()
            .map_err(|e| format!("Invalid Solidity type '{}': {e}", param.ty))?;
        let coerced = coerce(&sol_type, value)
            .map_err(|e| format!("Invalid value for '{}': {e}", param.name))?;
        parsed.push(coerced);
    }
    Ok(parsed)
}

/// Coerce one JSON argument; arrays and tuples recurse, scalars go through their string form
fn coerce(ty: &DynSolType, value: &JsonValue) -> Result<DynSolValue, String> {
    match (ty, value) {
        (DynSolType::Array(inner), JsonValue::Array(items)) => items
            .iter()
            .map(|item| coerce(inner, item))
            .collect::<Result<Vec<_>, _>>()
            .map(DynSolValue::Array),
        (DynSolType::FixedArray(inner, len), JsonValue::Array(items)) => {
            if items.len() != *len {
                return Err(format!("expected {len} elements, got {}", items.len()));
            }
            items
                .iter()
                .map(|item| coerce(inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::FixedArray)
        }
        (DynSolType::Tuple(types), JsonValue::Array(items)) => {
            if items.len() != types.len() {
                return Err(format!(
                    "expected {} tuple fields, got {}",
                    types.len(),
                    items.len()
                ));
            }
            types
                .iter()
                .zip(items)
                .map(|(ty, item)| coerce(ty, item))
                .collect::<Result<Vec<_>, _>>()
                .map(DynSolValue::Tuple)
        }
        (_, JsonValue::String(text)) => ty.coerce_str(text).map_err(|e| e.to_string()),
        (_, JsonValue::Number(number)) => ty
            .coerce_str(&number.to_string())
            .map_err(|e| e.to_string()),
        (_, JsonValue::Bool(flag)) => ty
            .coerce_str(if *flag { "true" } else { "false" })
            .map_err(|e| e.to_string()),
        _ => Err(format!("cannot convert {value} to {}", ty.sol_type_name())),
    }
}

/// An encoded call, the unit every execution path works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Target contract
    pub to: Address,
    /// Encoded calldata
    pub data: Bytes,
    /// Native value in wei
    pub value: U256,
    /// Function name, for logs
    pub function: Option<String>,
}

impl ContractCall {
    /// Wrap pre-encoded calldata
    pub fn raw(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::ZERO,
            function: None,
        }
    }

    /// Wrap a typed `sol!` call
    pub fn typed<C: alloy::sol_types::SolCall>(to: Address, call: &C) -> Self {
        Self {
            to,
            data: call.abi_encode().into(),
            value: U256::ZERO,
            function: Some(C::SIGNATURE.split('(').next().unwrap_or(C::SIGNATURE).to_string()),
        }
    }

    /// Set native value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Label used in logs
    pub fn label(&self) -> &str {
        self.function.as_deref().unwrap_or("call")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::IERC20;
    use alloy::primitives::address;
    use alloy::sol_types::SolCall;
    use serde_json::json;

    const TOKEN: Address = address!("0x00000000000000000000000000000000000000aa");
    const SPENDER: Address = address!("0x00000000000000000000000000000000000000bb");

    #[test]
    fn test_human_readable_matches_typed_encoding() {
        let spec = CallSpec::new(
            TOKEN,
            AbiSource::human_readable([
                "function approve(address spender, uint256 amount) returns (bool)",
                "event Approval(address indexed owner, address indexed spender, uint256 value)",
            ]),
            "approve",
            vec![json!(SPENDER.to_string()), json!("1000")],
        );

        let call = spec.encode().unwrap();
        let expected = IERC20::approveCall {
            spender: SPENDER,
            amount: U256::from(1000u64),
        }
        .abi_encode();

        assert_eq!(call.to, TOKEN);
        assert_eq!(call.data.as_ref(), expected.as_slice());
        assert_eq!(call.label(), "approve");
    }

    #[test]
    fn test_json_abi_matches_human_readable() {
        let abi = AbiSource::json(
            r#"[{"type":"function","name":"transfer","stateMutability":"nonpayable",
                "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
                "outputs":[{"name":"","type":"bool"}]}]"#,
        )
        .unwrap();
        let args = vec![json!(SPENDER.to_string()), json!("42")];

        let from_json = CallSpec::new(TOKEN, abi, "transfer", args.clone()).encode().unwrap();
        let from_text = CallSpec::new(
            TOKEN,
            AbiSource::human_readable(["function transfer(address to, uint256 amount)"]),
            "transfer",
            args,
        )
        .encode()
        .unwrap();

        assert_eq!(from_json.data, from_text.data);
    }

    #[test]
    fn test_overload_resolved_by_arity() {
        let spec = CallSpec::new(
            TOKEN,
            AbiSource::human_readable([
                "function stake(uint256 amount)",
                "function stake(uint256 amount, address beneficiary)",
            ]),
            "stake",
            vec![json!("5"), json!(SPENDER.to_string())],
        );

        let call = spec.encode().unwrap();
        // selector + two words
        assert_eq!(call.data.len(), 4 + 64);
    }

    #[test]
    fn test_missing_function_and_bad_arity() {
        let abi = AbiSource::human_readable(["function stake(uint256 amount)"]);

        let missing = CallSpec::new(TOKEN, abi.clone(), "unstake", vec![]).encode();
        assert_eq!(missing, Err(AbiError::FunctionNotFound("unstake".into())));

        let arity = CallSpec::new(TOKEN, abi, "stake", vec![]).encode();
        assert!(matches!(arity, Err(AbiError::NoMatchingOverload { args: 0, .. })));
    }

    #[test]
    fn test_uncoercible_argument() {
        let spec = CallSpec::new(
            TOKEN,
            AbiSource::human_readable(["function stake(uint256 amount)"]),
            "stake",
            vec![json!("not-a-number")],
        );
        assert!(matches!(spec.encode(), Err(AbiError::Encoding { .. })));
    }

    #[test]
    fn test_array_and_tuple_arguments() {
        let spec = CallSpec::new(
            TOKEN,
            AbiSource::human_readable([
                "function airdrop(address[] recipients, uint256[] amounts, (uint256,bool) options)",
            ]),
            "airdrop",
            vec![
                json!([SPENDER.to_string()]),
                json!([3]),
                json!([5, true]),
            ],
        );

        let function =
            Function::parse("function airdrop(address[], uint256[], (uint256,bool))").unwrap();
        let expected = function
            .abi_encode_input(&[
                DynSolValue::Array(vec![DynSolValue::Address(SPENDER)]),
                DynSolValue::Array(vec![DynSolValue::Uint(U256::from(3u64), 256)]),
                DynSolValue::Tuple(vec![
                    DynSolValue::Uint(U256::from(5u64), 256),
                    DynSolValue::Bool(true),
                ]),
            ])
            .unwrap();

        assert_eq!(spec.encode().unwrap().data.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_tuple_field_count_checked() {
        let spec = CallSpec::new(
            TOKEN,
            AbiSource::human_readable(["function configure((uint256,bool) options)"]),
            "configure",
            vec![json!([5])],
        );
        assert!(matches!(spec.encode(), Err(AbiError::Encoding { .. })));
    }

    #[test]
    fn test_native_value_carried() {
        let spec = CallSpec::new(
            TOKEN,
            AbiSource::human_readable(["function deposit()"]),
            "deposit",
            vec![],
        )
        .with_value(U256::from(7u64));
        assert_eq!(spec.encode().unwrap().value, U256::from(7u64));
    }
}
