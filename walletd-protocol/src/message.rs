//! JSON-RPC message types for wallet requests and responses.

use crate::error::{ErrorCode, ProtocolError};
use crate::params::{FieldKind, FieldSpec, Params};
use crate::JSONRPC_VERSION;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Wallet API methods.
///
/// The wire names are fixed; anything else is answered with
/// `MethodNotFound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    // Addresses
    Address,
    AllAddresses,
    GenerateEcAddress,
    GenerateFactoidAddress,
    ImportAddresses,
    WalletBackup,

    // Transaction drafts
    NewTransaction,
    DeleteTransaction,
    AddInput,
    AddOutput,
    AddEcOutput,
    AddFee,
    SubFee,
    SignTransaction,
    ComposeTransaction,
}

impl Method {
    /// Every method in the dispatch table.
    pub const ALL: [Method; 15] = [
        Method::Address,
        Method::AllAddresses,
        Method::GenerateEcAddress,
        Method::GenerateFactoidAddress,
        Method::ImportAddresses,
        Method::WalletBackup,
        Method::NewTransaction,
        Method::DeleteTransaction,
        Method::AddInput,
        Method::AddOutput,
        Method::AddEcOutput,
        Method::AddFee,
        Method::SubFee,
        Method::SignTransaction,
        Method::ComposeTransaction,
    ];

    /// Returns the wire name of this method.
    pub fn name(&self) -> &'static str {
        match self {
            Method::Address => "address",
            Method::AllAddresses => "all-addresses",
            Method::GenerateEcAddress => "generate-ec-address",
            Method::GenerateFactoidAddress => "generate-factoid-address",
            Method::ImportAddresses => "import-addresses",
            Method::WalletBackup => "wallet-backup",
            Method::NewTransaction => "new-transaction",
            Method::DeleteTransaction => "delete-transaction",
            Method::AddInput => "add-input",
            Method::AddOutput => "add-output",
            Method::AddEcOutput => "add-ec-output",
            Method::AddFee => "add-fee",
            Method::SubFee => "sub-fee",
            Method::SignTransaction => "sign-transaction",
            Method::ComposeTransaction => "compose-transaction",
        }
    }

    /// Looks up a method by its exact wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Request message envelope.
///
/// `method` is kept as a string so that unknown methods survive parsing and
/// can be answered with `MethodNotFound`. `id` is opaque and echoed verbatim;
/// an absent id is represented as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    /// Protocol version, always "2.0".
    pub jsonrpc: String,

    /// Caller-chosen correlation ID.
    pub id: Value,

    /// Method name.
    pub method: String,

    /// Method-specific parameters.
    pub params: Value,
}

impl Request {
    pub fn new(id: impl Into<Value>, method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params: Value::Object(Map::new()),
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Parses a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_slice(body)?;
        Self::from_value(value)
    }

    /// Builds a request from an already-decoded JSON value.
    ///
    /// `jsonrpc` may be omitted but must be "2.0" when present; `method` is
    /// required and must be a string.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let Value::Object(mut obj) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        match obj.remove("jsonrpc") {
            None => {}
            Some(Value::String(v)) if v == JSONRPC_VERSION => {}
            Some(Value::String(v)) => return Err(ProtocolError::UnsupportedVersion(v)),
            Some(other) => return Err(ProtocolError::UnsupportedVersion(other.to_string())),
        }

        let method = match obj.remove("method") {
            Some(Value::String(m)) => m,
            Some(_) => return Err(ProtocolError::InvalidField("method")),
            None => return Err(ProtocolError::MissingField("method")),
        };

        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: obj.remove("id").unwrap_or(Value::Null),
            method,
            params: obj.remove("params").unwrap_or(Value::Null),
        })
    }

    /// Resolves the method name against the dispatch table.
    pub fn method(&self) -> Option<Method> {
        Method::from_name(&self.method)
    }
}

/// Error object in a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Stable error code.
    pub code: ErrorCode,

    /// Human-readable error message.
    pub message: String,

    /// Additional context, usually the underlying failure text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.message().to_string(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// Response message envelope.
///
/// Exactly one of `result` and `error` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Protocol version, always "2.0".
    pub jsonrpc: String,

    /// Request ID this response correlates to.
    #[serde(default)]
    pub id: Value,

    /// Result payload (for successful responses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error details (for error responses).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the error code, if this is an error response.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error.as_ref().map(|e| e.code)
    }

    /// Renders the response as a JSON body.
    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(serde_json::to_vec(self)?)
    }
}

// ============================================================================
// Method-specific parameter types
// ============================================================================

/// Parameters for `address`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressParams {
    pub address: String,
}

impl Params for AddressParams {
    const FIELDS: &'static [FieldSpec] = &[FieldSpec::new("address", FieldKind::String)];
}

/// Parameters for `new-transaction`, `delete-transaction`,
/// `sign-transaction` and `compose-transaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionParams {
    pub name: String,
}

impl Params for TransactionParams {
    const FIELDS: &'static [FieldSpec] = &[FieldSpec::new("name", FieldKind::String)];
}

/// Parameters for `add-input`, `add-output` and `add-ec-output`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionValueParams {
    pub name: String,
    pub address: String,
    /// Amount in factoshis.
    pub amount: u64,
}

impl Params for TransactionValueParams {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("name", FieldKind::String),
        FieldSpec::new("address", FieldKind::String),
        FieldSpec::new("amount", FieldKind::Unsigned),
    ];
}

/// Parameters for `add-fee` and `sub-fee`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionAddressParams {
    pub name: String,
    pub address: String,
}

impl Params for TransactionAddressParams {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("name", FieldKind::String),
        FieldSpec::new("address", FieldKind::String),
    ];
}

/// One secret in an `import-addresses` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretParams {
    pub secret: String,
}

const SECRET_FIELDS: &[FieldSpec] = &[FieldSpec::new("secret", FieldKind::String)];

/// Parameters for `import-addresses`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportParams {
    pub addresses: Vec<SecretParams>,
}

impl Params for ImportParams {
    const FIELDS: &'static [FieldSpec] = &[FieldSpec::new(
        "addresses",
        FieldKind::ObjectArray(SECRET_FIELDS),
    )];
}

// ============================================================================
// Result types
// ============================================================================

/// A public/secret address pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressResult {
    pub public: String,
    pub secret: String,
}

/// Result for `all-addresses` and `import-addresses`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiAddressResult {
    pub addresses: Vec<AddressResult>,
}

/// Result for `wallet-backup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBackupResult {
    #[serde(rename = "wallet-seed")]
    pub seed: String,
    pub addresses: Vec<AddressResult>,
}

/// Method name of the factomd call a composed transaction is addressed to.
pub const FACTOID_SUBMIT: &str = "factoid-submit";

/// Parameters of a composed `factoid-submit` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTransactionParams {
    /// Hex encoding of the signed transaction.
    pub transaction: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_names_roundtrip() {
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.name()), Some(method));
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.name()));
        }
        assert_eq!(Method::from_name("bogus"), None);
        assert_eq!(Method::from_name("Address"), None);
    }

    #[test]
    fn test_parse_request() {
        let req = Request::parse(
            br#"{"jsonrpc":"2.0","id":7,"method":"address","params":{"address":"x"}}"#,
        )
        .unwrap();
        assert_eq!(req.id, json!(7));
        assert_eq!(req.method, "address");
        assert_eq!(req.method(), Some(Method::Address));
        assert_eq!(req.params["address"], "x");
    }

    #[test]
    fn test_parse_request_without_version_or_id() {
        let req = Request::parse(br#"{"method":"all-addresses"}"#).unwrap();
        assert_eq!(req.id, Value::Null);
        assert_eq!(req.params, Value::Null);
        assert_eq!(req.method(), Some(Method::AllAddresses));
    }

    #[test]
    fn test_parse_request_keeps_unknown_method() {
        let req = Request::parse(br#"{"method":"bogus","params":{},"id":"abc"}"#).unwrap();
        assert_eq!(req.method, "bogus");
        assert_eq!(req.method(), None);
        assert_eq!(req.id, json!("abc"));
    }

    #[test]
    fn test_parse_request_rejects_malformed() {
        assert!(matches!(
            Request::parse(b"{not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            Request::parse(b"[1,2,3]"),
            Err(ProtocolError::NotAnObject)
        ));
        assert!(matches!(
            Request::parse(br#"{"id":1}"#),
            Err(ProtocolError::MissingField("method"))
        ));
        assert!(matches!(
            Request::parse(br#"{"method":5}"#),
            Err(ProtocolError::InvalidField("method"))
        ));
        assert!(matches!(
            Request::parse(br#"{"jsonrpc":"1.0","method":"address"}"#),
            Err(ProtocolError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_response_ok_serialization() {
        let resp = Response::ok(json!(1), json!("success"));
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":1,"result":"success"}"#);
        assert!(resp.is_ok());
    }

    #[test]
    fn test_response_error_serialization() {
        let err = ErrorObject::new(ErrorCode::InternalError).with_data("wallet is locked");
        let resp = Response::error(Value::Null, err);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""id":null"#));
        assert!(json.contains(r#""code":-32603"#));
        assert!(json.contains(r#""message":"Internal error""#));
        assert!(json.contains(r#""data":"wallet is locked""#));
        assert!(!json.contains("result"));
        assert_eq!(resp.error_code(), Some(ErrorCode::InternalError));
    }

    #[test]
    fn test_response_deserialization() {
        let resp: Response = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":"a","error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.id, json!("a"));
        assert_eq!(resp.error_code(), Some(ErrorCode::MethodNotFound));
    }

    #[test]
    fn test_wallet_backup_field_names() {
        let backup = WalletBackupResult {
            seed: "00ff".to_string(),
            addresses: vec![AddressResult {
                public: "FA".to_string(),
                secret: "Fs".to_string(),
            }],
        };
        let value = serde_json::to_value(&backup).unwrap();
        assert_eq!(value["wallet-seed"], "00ff");
        assert_eq!(value["addresses"][0]["public"], "FA");
        assert_eq!(value["addresses"][0]["secret"], "Fs");
    }
}
