//! JSON-RPC request dispatch.
//!
//! Every request yields exactly one response. Envelope failures short-circuit
//! with `InvalidRequest` and a null id; parameter shape failures are caught
//! before the wallet is touched; wallet and codec failures are wrapped as
//! `InternalError` with the underlying message as `data`.

use crate::error::ServerError;
use crate::metrics::Metrics;
use serde_json::{json, Value};
use std::sync::Arc;
use walletd_core::{classify, AddressKind, EcAddress, FactoidAddress, KeyedAddress};
use walletd_protocol::message::*;
use walletd_protocol::{bind_params, ErrorObject, Method, Params, Request, Response};
use walletd_wallet::{RateSource, Wallet, WalletAddress};

/// Result payload of mutation-only methods.
const SUCCESS: &str = "success";

/// Dispatches wallet API requests.
pub struct RequestHandler {
    wallet: Arc<Wallet>,
    rate: Arc<dyn RateSource>,
    /// Metrics for request tracking.
    metrics: Option<Arc<Metrics>>,
}

impl RequestHandler {
    pub fn new(wallet: Arc<Wallet>, rate: Arc<dyn RateSource>) -> Self {
        Self {
            wallet,
            rate,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn wallet(&self) -> &Arc<Wallet> {
        &self.wallet
    }

    pub fn metrics(&self) -> Option<&Arc<Metrics>> {
        self.metrics.as_ref()
    }

    /// Updates gauge metrics from current wallet state.
    pub fn update_gauge_metrics(&self) {
        if let Some(ref metrics) = self.metrics {
            metrics.addresses_total.set(self.wallet.address_count() as f64);
            metrics
                .transactions_active
                .set(self.wallet.transaction_count() as f64);
        }
    }

    /// Handles a raw request body.
    pub fn handle_body(&self, body: &[u8]) -> Response {
        match Request::parse(body) {
            Ok(request) => self.handle(&request),
            Err(e) => self.reject(ServerError::from(e)),
        }
    }

    /// Answers a request that never reached dispatch.
    pub fn reject(&self, err: ServerError) -> Response {
        tracing::debug!("Rejected request: {}", err);
        if let Some(ref metrics) = self.metrics {
            let code = err.error_code().code().to_string();
            metrics.errors_total.with_label_values(&[code.as_str()]).inc();
        }
        Response::error(Value::Null, error_object(&err))
    }

    /// Handles a parsed request and returns a response.
    pub fn handle(&self, request: &Request) -> Response {
        let method = request.method();
        let method_name = method.map(|m| m.name()).unwrap_or("unknown");

        let timer = self.metrics.as_ref().map(|m| {
            m.request_duration
                .with_label_values(&[method_name])
                .start_timer()
        });

        let result = match method {
            Some(method) => self.dispatch(method, &request.params),
            None => Err(ServerError::MethodNotFound(request.method.clone())),
        };

        if let Some(ref metrics) = self.metrics {
            metrics.requests_total.with_label_values(&[method_name]).inc();
            if let Err(ref e) = result {
                let code = e.error_code().code().to_string();
                metrics.errors_total.with_label_values(&[code.as_str()]).inc();
            }
        }
        drop(timer); // Observation happens on drop
        self.update_gauge_metrics();

        match result {
            Ok(value) => {
                tracing::info!("{} ok", request.method);
                Response::ok(request.id.clone(), value)
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", request.method, e);
                Response::error(request.id.clone(), error_object(&e))
            }
        }
    }

    fn dispatch(&self, method: Method, params: &Value) -> Result<Value, ServerError> {
        match method {
            Method::Address => self.handle_address(bind(params)?),
            Method::AllAddresses => self.handle_all_addresses(),
            Method::GenerateEcAddress => self.handle_generate_ec_address(),
            Method::GenerateFactoidAddress => self.handle_generate_factoid_address(),
            Method::ImportAddresses => self.handle_import_addresses(bind(params)?),
            Method::WalletBackup => self.handle_wallet_backup(),
            Method::NewTransaction => self.handle_new_transaction(bind(params)?),
            Method::DeleteTransaction => self.handle_delete_transaction(bind(params)?),
            Method::AddInput => self.handle_add_input(bind(params)?),
            Method::AddOutput => self.handle_add_output(bind(params)?),
            Method::AddEcOutput => self.handle_add_ec_output(bind(params)?),
            Method::AddFee => self.handle_add_fee(bind(params)?),
            Method::SubFee => self.handle_sub_fee(bind(params)?),
            Method::SignTransaction => self.handle_sign_transaction(bind(params)?),
            Method::ComposeTransaction => self.handle_compose_transaction(bind(params)?),
        }
    }

    // Addresses

    fn handle_address(&self, params: AddressParams) -> Result<Value, ServerError> {
        let result = match classify(&params.address) {
            AddressKind::FactoidPublic => {
                address_result(&self.wallet.get_fct_address(&params.address)?)
            }
            AddressKind::EcPublic => address_result(&self.wallet.get_ec_address(&params.address)?),
            kind => {
                return Err(ServerError::UnrecognizedAddress(format!(
                    "invalid address type: {}",
                    kind
                )))
            }
        };
        to_value(result)
    }

    fn handle_all_addresses(&self) -> Result<Value, ServerError> {
        to_value(MultiAddressResult {
            addresses: self.listed_addresses(),
        })
    }

    fn handle_generate_ec_address(&self) -> Result<Value, ServerError> {
        let address = self.wallet.generate_ec_address()?;
        to_value(address_result(&address))
    }

    fn handle_generate_factoid_address(&self) -> Result<Value, ServerError> {
        let address = self.wallet.generate_factoid_address()?;
        to_value(address_result(&address))
    }

    fn handle_import_addresses(&self, params: ImportParams) -> Result<Value, ServerError> {
        // Every secret is checked before anything is stored.
        let mut addresses = Vec::with_capacity(params.addresses.len());
        for (index, entry) in params.addresses.iter().enumerate() {
            let address = match classify(&entry.secret) {
                AddressKind::FactoidSecret => {
                    WalletAddress::Factoid(FactoidAddress::from_secret_string(&entry.secret)?)
                }
                AddressKind::EcSecret => {
                    WalletAddress::Ec(EcAddress::from_secret_string(&entry.secret)?)
                }
                kind => {
                    return Err(ServerError::UnrecognizedAddress(format!(
                        "addresses[{}]: invalid address type: {}",
                        index, kind
                    )))
                }
            };
            addresses.push(address);
        }

        let results: Vec<AddressResult> = addresses.iter().map(wallet_address_result).collect();
        self.wallet.import(addresses)?;
        to_value(MultiAddressResult { addresses: results })
    }

    fn handle_wallet_backup(&self) -> Result<Value, ServerError> {
        to_value(WalletBackupResult {
            seed: self.wallet.seed_hex(),
            addresses: self.listed_addresses(),
        })
    }

    fn listed_addresses(&self) -> Vec<AddressResult> {
        self.wallet
            .all_addresses()
            .iter()
            .map(wallet_address_result)
            .collect()
    }

    // Transaction drafts

    fn handle_new_transaction(&self, params: TransactionParams) -> Result<Value, ServerError> {
        self.wallet.new_transaction(&params.name)?;
        Ok(json!(SUCCESS))
    }

    fn handle_delete_transaction(&self, params: TransactionParams) -> Result<Value, ServerError> {
        self.wallet.delete_transaction(&params.name)?;
        Ok(json!(SUCCESS))
    }

    fn handle_add_input(&self, params: TransactionValueParams) -> Result<Value, ServerError> {
        self.wallet
            .add_input(&params.name, &params.address, params.amount)?;
        Ok(json!(SUCCESS))
    }

    fn handle_add_output(&self, params: TransactionValueParams) -> Result<Value, ServerError> {
        self.wallet
            .add_output(&params.name, &params.address, params.amount)?;
        Ok(json!(SUCCESS))
    }

    fn handle_add_ec_output(&self, params: TransactionValueParams) -> Result<Value, ServerError> {
        self.wallet
            .add_ec_output(&params.name, &params.address, params.amount)?;
        Ok(json!(SUCCESS))
    }

    fn handle_add_fee(&self, params: TransactionAddressParams) -> Result<Value, ServerError> {
        let rate = self.rate.ec_rate()?;
        self.wallet.add_fee(&params.name, &params.address, rate)?;
        Ok(json!(SUCCESS))
    }

    fn handle_sub_fee(&self, params: TransactionAddressParams) -> Result<Value, ServerError> {
        let rate = self.rate.ec_rate()?;
        self.wallet.sub_fee(&params.name, &params.address, rate)?;
        Ok(json!(SUCCESS))
    }

    fn handle_sign_transaction(&self, params: TransactionParams) -> Result<Value, ServerError> {
        self.wallet.sign_transaction(&params.name)?;
        Ok(json!(SUCCESS))
    }

    /// Returns a ready-to-send `factoid-submit` request for the draft.
    fn handle_compose_transaction(&self, params: TransactionParams) -> Result<Value, ServerError> {
        let tx = self.wallet.compose_transaction(&params.name)?;
        let submit = SubmitTransactionParams {
            transaction: tx.hex(),
        };
        let request = Request::new(0, FACTOID_SUBMIT).with_params(to_value(submit)?);
        to_value(request)
    }
}

fn bind<P: Params>(params: &Value) -> Result<P, ServerError> {
    Ok(bind_params(params)?)
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, ServerError> {
    Ok(serde_json::to_value(value)?)
}

fn address_result<A: KeyedAddress>(address: &A) -> AddressResult {
    AddressResult {
        public: address.public_string(),
        secret: address.secret_string(),
    }
}

fn wallet_address_result(address: &WalletAddress) -> AddressResult {
    AddressResult {
        public: address.public_string(),
        secret: address.secret_string(),
    }
}

fn error_object(err: &ServerError) -> ErrorObject {
    ErrorObject::new(err.error_code()).with_data(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use walletd_protocol::ErrorCode;
    use walletd_wallet::FixedRate;

    const FS: &str = "Fs3E9gV6DXsYzf7Fqx1fVBQPQXV695eP3k5XbmHEZVRLkMdD9qCK";
    const FA: &str = "FA2jK2HcLnRdS94dEcU27rF3meoJfpUcZPSinpb7AwQvPRY6RL1Q";
    const ES: &str = "Es2Rf7iM6PdsqfYCo3D1tnAR65SkLENyWJG1deUzpRMQmbh9F3eG";
    const EC: &str = "EC2DKSYyRcNWf7RS963VFYgMExoHRYLHVeCfQ9PGPmNzwrcmgm2r";
    const OTHER_FA: &str = "FA1y5ZGuHSLmf2TqNf6hVMkPiNGyQpQDTFJvDLRkKQaoPo4bmbgu";

    fn test_handler() -> RequestHandler {
        let wallet = Arc::new(Wallet::from_seed([3u8; walletd_wallet::SEED_LEN]));
        let metrics = Arc::new(Metrics::new().unwrap());
        RequestHandler::new(wallet, Arc::new(FixedRate::new(1000))).with_metrics(metrics)
    }

    fn call(handler: &RequestHandler, body: Value) -> Response {
        handler.handle_body(body.to_string().as_bytes())
    }

    fn import_known(handler: &RequestHandler) {
        let response = call(
            handler,
            json!({"method": "import-addresses", "params": {"addresses": [{"secret": FS}, {"secret": ES}]}, "id": 1}),
        );
        assert!(response.is_ok(), "{:?}", response.error);
    }

    #[test]
    fn test_unknown_method() {
        let handler = test_handler();
        let response = call(&handler, json!({"method": "bogus", "params": {}, "id": 7}));
        assert_eq!(response.error_code(), Some(ErrorCode::MethodNotFound));
        assert_eq!(response.id, json!(7));
        assert!(response.result.is_none());
    }

    #[test]
    fn test_wrong_param_name() {
        let handler = test_handler();
        let response = call(
            &handler,
            json!({"method": "address", "params": {"addr": "x"}, "id": 1}),
        );
        assert_eq!(response.error_code(), Some(ErrorCode::InvalidParams));
        assert_eq!(response.id, json!(1));
        let data = response.error.unwrap().data.unwrap();
        assert_eq!(data, json!("missing field 'address'"));
    }

    #[test]
    fn test_malformed_body() {
        let handler = test_handler();
        let bodies: [&[u8]; 5] = [
            b"{not json",
            b"[1,2]",
            b"{\"id\":1}",
            b"",
            b"{\"method\":\"address\",\"jsonrpc\":\"1.0\",\"id\":3}",
        ];
        for body in bodies {
            let response = handler.handle_body(body);
            assert_eq!(response.error_code(), Some(ErrorCode::InvalidRequest));
            assert_eq!(response.id, Value::Null);
        }
    }

    #[test]
    fn test_id_echoed_verbatim() {
        let handler = test_handler();
        for id in [json!("abc"), json!(null), json!(3.5), json!({"nested": [1]})] {
            let response = call(&handler, json!({"jsonrpc": "2.0", "method": "all-addresses", "id": id}));
            assert!(response.is_ok());
            assert_eq!(response.id, id);
        }
        // Absent id comes back as null.
        let response = call(&handler, json!({"method": "all-addresses"}));
        assert_eq!(response.id, Value::Null);
    }

    #[test]
    fn test_address_lookup() {
        let handler = test_handler();
        import_known(&handler);

        let response = call(&handler, json!({"method": "address", "params": {"address": FA}, "id": 1}));
        assert_eq!(response.result.unwrap(), json!({"public": FA, "secret": FS}));

        let response = call(&handler, json!({"method": "address", "params": {"address": EC}, "id": 2}));
        assert_eq!(response.result.unwrap(), json!({"public": EC, "secret": ES}));

        // Not in the wallet.
        let response = call(&handler, json!({"method": "address", "params": {"address": OTHER_FA}, "id": 3}));
        assert_eq!(response.error_code(), Some(ErrorCode::InternalError));
    }

    #[test]
    fn test_unrecognized_address_is_internal_error() {
        let handler = test_handler();
        for address in ["nonsense", FS] {
            let response = call(&handler, json!({"method": "address", "params": {"address": address}, "id": 1}));
            let error = response.error.unwrap();
            assert_eq!(error.code, ErrorCode::InternalError);
            assert!(error.data.unwrap().as_str().unwrap().contains("invalid address type"));
        }

        let response = call(
            &handler,
            json!({"method": "import-addresses", "params": {"addresses": [{"secret": FS}, {"secret": FA}]}, "id": 1}),
        );
        assert_eq!(response.error_code(), Some(ErrorCode::InternalError));
        // Nothing was stored.
        assert_eq!(handler.wallet().address_count(), 0);
    }

    #[test]
    fn test_generate_and_list() {
        let handler = test_handler();
        let fct = call(&handler, json!({"method": "generate-factoid-address", "id": 1}))
            .result
            .unwrap();
        let ec = call(&handler, json!({"method": "generate-ec-address", "params": {"ignored": true}, "id": 2}))
            .result
            .unwrap();
        assert!(fct["public"].as_str().unwrap().starts_with("FA"));
        assert!(fct["secret"].as_str().unwrap().starts_with("Fs"));
        assert!(ec["public"].as_str().unwrap().starts_with("EC"));

        let all = call(&handler, json!({"method": "all-addresses", "id": 3})).result.unwrap();
        assert_eq!(all["addresses"], json!([fct, ec]));

        let backup = call(&handler, json!({"method": "wallet-backup", "id": 4})).result.unwrap();
        assert_eq!(backup["wallet-seed"], json!(handler.wallet().seed_hex()));
        assert_eq!(backup["addresses"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_transaction_flow() {
        let handler = test_handler();
        import_known(&handler);

        let steps = [
            json!({"method": "new-transaction", "params": {"name": "tx"}}),
            json!({"method": "add-input", "params": {"name": "tx", "address": FA, "amount": 100000}}),
            json!({"method": "add-output", "params": {"name": "tx", "address": OTHER_FA, "amount": 60000}}),
            json!({"method": "add-ec-output", "params": {"name": "tx", "address": EC, "amount": 40000}}),
            json!({"method": "add-fee", "params": {"name": "tx", "address": FA}}),
            json!({"method": "sign-transaction", "params": {"name": "tx"}}),
        ];
        for (i, step) in steps.into_iter().enumerate() {
            let mut step = step;
            step["id"] = json!(i);
            let response = call(&handler, step);
            assert_eq!(response.result, Some(json!("success")), "step {}: {:?}", i, response.error);
        }

        let composed = call(
            &handler,
            json!({"method": "compose-transaction", "params": {"name": "tx"}, "id": 9}),
        )
        .result
        .unwrap();
        assert_eq!(composed["jsonrpc"], json!("2.0"));
        assert_eq!(composed["id"], json!(0));
        assert_eq!(composed["method"], json!("factoid-submit"));
        let hex = composed["params"]["transaction"].as_str().unwrap();
        let tx = handler.wallet().get_transaction("tx").unwrap();
        assert_eq!(hex, tx.hex());

        let response = call(&handler, json!({"method": "delete-transaction", "params": {"name": "tx"}, "id": 10}));
        assert_eq!(response.result, Some(json!("success")));
        let response = call(&handler, json!({"method": "delete-transaction", "params": {"name": "tx"}, "id": 11}));
        assert_eq!(response.error_code(), Some(ErrorCode::InternalError));
    }

    #[test]
    fn test_compose_unsigned_fails() {
        let handler = test_handler();
        import_known(&handler);
        call(&handler, json!({"method": "new-transaction", "params": {"name": "tx"}, "id": 1}));
        call(&handler, json!({"method": "add-input", "params": {"name": "tx", "address": FA, "amount": 5}, "id": 2}));

        let response = call(&handler, json!({"method": "compose-transaction", "params": {"name": "tx"}, "id": 3}));
        let error = response.error.unwrap();
        assert_eq!(error.code, ErrorCode::InternalError);
        assert_eq!(error.data, Some(json!("transaction is not signed")));
    }

    #[test]
    fn test_param_types_checked_before_wallet() {
        let handler = test_handler();
        let response = call(
            &handler,
            json!({"method": "add-output", "params": {"name": "tx", "address": OTHER_FA, "amount": "10"}, "id": 1}),
        );
        assert_eq!(response.error_code(), Some(ErrorCode::InvalidParams));

        let response = call(&handler, json!({"method": "new-transaction", "params": ["tx"], "id": 2}));
        assert_eq!(response.error_code(), Some(ErrorCode::InvalidParams));
        assert_eq!(handler.wallet().transaction_count(), 0);
    }

    #[test]
    fn test_metrics_recorded() {
        let handler = test_handler();
        call(&handler, json!({"method": "bogus", "id": 1}));
        call(&handler, json!({"method": "new-transaction", "params": {"name": "a"}, "id": 2}));

        let encoded = String::from_utf8(handler.metrics().unwrap().encode()).unwrap();
        assert!(encoded.contains("walletd_requests_total{method=\"unknown\"} 1"));
        assert!(encoded.contains("walletd_errors_total{code=\"-32601\"} 1"));
        assert!(encoded.contains("walletd_transactions_active 1"));
    }
}
