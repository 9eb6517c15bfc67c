//! Delivery management: API calls, signals and state
//!
//! [`DeliveryService`] runs the requests and reports their progress as
//! [`DeliverySignal`]s on a [`SignalBus`]. [`DeliveryReducer`] turns those
//! signals into a [`DeliveryState`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::{ApiClient, ApiRetryOptions};
use crate::dispatch::SignalBus;
use crate::error::ApiError;
use crate::parse::{parse_instance, parse_result_list};
use crate::reducers::{ApiCallReducer, ModelApiCallReducer, ModelDataReducer, Reducer};
use crate::retry::{retry, ExhaustGate};
use crate::types::{
    ApiCallState, ModelApiCallState, ModelDataState, ModelInstance, ModelSignal, ResultList,
    Signal, SignalError,
};

pub const DELIVERIES_PATH: &str = "deliveries";
pub const FINISH_DELIVERY_PATH: &str = "finishDelivery";
pub const FINISH_RETRY_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: String,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub customer: String,
}

impl ModelInstance for Delivery {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Undelivered,
}

/// Typed access to the delivery endpoints
#[derive(Clone)]
pub struct DeliveryApi {
    client: ApiClient,
}

impl DeliveryApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Fetch the delivery list, retrying with the client's policy
    pub async fn list(&self) -> Result<ResultList<Delivery>, ApiError> {
        let raw = self.client.get_with_retry(DELIVERIES_PATH, &[]).await?;
        parse_result_list(parse_instance::<Delivery>, &raw)
    }

    /// Report the outcome of a delivery
    ///
    /// Retried at most [`FINISH_RETRY_ATTEMPTS`] times; interval and
    /// retryable kinds come from the client's policy.
    pub async fn finish(&self, delivery: &Delivery, status: DeliveryStatus) -> Result<Value, ApiError> {
        let body = json!({
            "deliveryId": delivery.id,
            "latitude": delivery.latitude,
            "longitude": delivery.longitude,
            "status": status,
        });
        let options = ApiRetryOptions::default()
            .retry_attempts(Some(FINISH_RETRY_ATTEMPTS))
            .resolve(self.client.retry_options());
        retry(
            || self.client.post(FINISH_DELIVERY_PATH, &[], Some(&body)),
            &options,
        )
        .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliverySignalKind {
    GetDeliveriesList,
    SetDeliveriesList,
    SetDeliveriesListError,
    FinishDelivery,
    SetDeliveryFinished,
    SetDeliveryFinishError,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliverySignal {
    GetDeliveriesList,
    SetDeliveriesList { data: ResultList<Delivery>, clear: bool },
    SetDeliveriesListError { error: SignalError },
    FinishDelivery { id: String },
    SetDeliveryFinished { delivery: Delivery },
    SetDeliveryFinishError { id: String, error: SignalError },
    Reset,
}

impl Signal for DeliverySignal {
    type Kind = DeliverySignalKind;

    fn kind(&self) -> &DeliverySignalKind {
        match self {
            DeliverySignal::GetDeliveriesList => &DeliverySignalKind::GetDeliveriesList,
            DeliverySignal::SetDeliveriesList { .. } => &DeliverySignalKind::SetDeliveriesList,
            DeliverySignal::SetDeliveriesListError { .. } => {
                &DeliverySignalKind::SetDeliveriesListError
            }
            DeliverySignal::FinishDelivery { .. } => &DeliverySignalKind::FinishDelivery,
            DeliverySignal::SetDeliveryFinished { .. } => &DeliverySignalKind::SetDeliveryFinished,
            DeliverySignal::SetDeliveryFinishError { .. } => {
                &DeliverySignalKind::SetDeliveryFinishError
            }
            DeliverySignal::Reset => &DeliverySignalKind::Reset,
        }
    }

    fn instance_id(&self) -> Option<&str> {
        match self {
            DeliverySignal::FinishDelivery { id }
            | DeliverySignal::SetDeliveryFinishError { id, .. } => Some(id),
            DeliverySignal::SetDeliveryFinished { delivery } => Some(&delivery.id),
            _ => None,
        }
    }

    fn error(&self) -> Option<&SignalError> {
        match self {
            DeliverySignal::SetDeliveriesListError { error }
            | DeliverySignal::SetDeliveryFinishError { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl ModelSignal<Delivery> for DeliverySignal {
    fn instance(&self) -> Option<&Delivery> {
        match self {
            DeliverySignal::SetDeliveryFinished { delivery } => Some(delivery),
            _ => None,
        }
    }

    fn result_list(&self) -> Option<&ResultList<Delivery>> {
        match self {
            DeliverySignal::SetDeliveriesList { data, .. } => Some(data),
            _ => None,
        }
    }

    fn clear(&self) -> bool {
        matches!(self, DeliverySignal::SetDeliveriesList { clear: true, .. })
    }
}

/// Everything the app knows about deliveries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryState {
    pub deliveries: ModelDataState<Delivery>,
    pub list_request: ApiCallState,
    pub finish_requests: ModelApiCallState,
}

pub struct DeliveryReducer {
    deliveries: ModelDataReducer<DeliverySignalKind, Delivery>,
    list_request: ApiCallReducer<DeliverySignalKind>,
    finish_requests: ModelApiCallReducer<DeliverySignalKind>,
}

impl Default for DeliveryReducer {
    fn default() -> Self {
        use DeliverySignalKind::*;

        Self {
            deliveries: ModelDataReducer::new(
                vec![SetDeliveriesList],
                vec![SetDeliveryFinished],
                vec![Reset],
            ),
            list_request: ApiCallReducer::new(
                GetDeliveriesList,
                SetDeliveriesList,
                SetDeliveriesListError,
            )
            .with_reset(Reset),
            finish_requests: ModelApiCallReducer::new(
                FinishDelivery,
                SetDeliveryFinished,
                SetDeliveryFinishError,
            ),
        }
    }
}

impl Reducer<DeliverySignal> for DeliveryReducer {
    type State = DeliveryState;

    fn initial_state(&self) -> DeliveryState {
        DeliveryState::default()
    }

    fn reduce(&self, state: &DeliveryState, signal: &DeliverySignal) -> DeliveryState {
        DeliveryState {
            deliveries: self.deliveries.reduce(&state.deliveries, signal),
            list_request: self.list_request.reduce(&state.list_request, signal),
            finish_requests: self.finish_requests.reduce(&state.finish_requests, signal),
        }
    }
}

/// Runs delivery requests and reports them on the signal bus
pub struct DeliveryService {
    api: DeliveryApi,
    bus: SignalBus<DeliverySignal>,
    list_gate: ExhaustGate,
}

impl DeliveryService {
    pub fn new(api: DeliveryApi, bus: SignalBus<DeliverySignal>) -> Self {
        Self {
            api,
            bus,
            list_gate: ExhaustGate::new(),
        }
    }

    pub fn bus(&self) -> &SignalBus<DeliverySignal> {
        &self.bus
    }

    /// Reload the delivery list
    ///
    /// Returns `None` when a reload is already running; the call is then
    /// ignored and emits nothing.
    pub async fn refresh(&self, clear: bool) -> Option<Result<u64, ApiError>> {
        let api = &self.api;
        let bus = &self.bus;
        self.list_gate
            .run(|| async move {
                bus.emit(DeliverySignal::GetDeliveriesList);
                match api.list().await {
                    Ok(data) => {
                        let count = data.count;
                        info!("Loaded {} of {} deliveries", data.results.len(), count);
                        bus.emit(DeliverySignal::SetDeliveriesList { data, clear });
                        Ok(count)
                    }
                    Err(e) => {
                        warn!("Failed to load deliveries: {}", e);
                        bus.emit(DeliverySignal::SetDeliveriesListError {
                            error: SignalError::from(&e),
                        });
                        Err(e)
                    }
                }
            })
            .await
    }

    /// Report a delivery as delivered or not
    ///
    /// A successful report is followed by a reload of the list, unless a
    /// reload is already running.
    pub async fn finish(&self, delivery: &Delivery, status: DeliveryStatus) -> Result<(), ApiError> {
        self.bus.emit(DeliverySignal::FinishDelivery {
            id: delivery.id.clone(),
        });
        match self.api.finish(delivery, status).await {
            Ok(_) => {
                self.bus.emit(DeliverySignal::SetDeliveryFinished {
                    delivery: delivery.clone(),
                });
                if self.refresh(false).await.is_none() {
                    debug!("Delivery list reload already in flight");
                }
                Ok(())
            }
            Err(e) => {
                warn!("Failed to finish delivery {}: {}", delivery.id, e);
                self.bus.emit(DeliverySignal::SetDeliveryFinishError {
                    id: delivery.id.clone(),
                    error: SignalError::from(&e),
                });
                Err(e)
            }
        }
    }
}
