//! In-process stand-in for a CTP-style trader library.
//!
//! [`MockCtpLibrary`] implements the native seams of `spibind-bridge` the way
//! the real library behaves: requests return immediately with a status code,
//! and responses arrive later as `On*` callbacks on a per-instance background
//! thread. Events travel to that thread over a crossbeam channel, so callbacks
//! for one instance come out in the order requests went in.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use spibind_bridge::{NativeApi, NativeFault, NativeLibrary, NativeSpi};
use spibind_core::{ConstValue, DeclarationModel};
use spibind_marshal::{MarshalError, Marshaler, NativeArg, Record, Scalar, Value};

pub const API_CLASS: &str = "CThostFtdcTraderApi";
pub const SPI_CLASS: &str = "CThostFtdcTraderSpi";
pub const API_VERSION: &str = "v6.3.15_mock";
pub const TRADING_DAY: &str = "20261019";

/// Error id reported for a login without a user id.
pub const ERR_INVALID_LOGIN: i32 = 3;

/// Declared order status of an accepted, untraded order.
pub const OST_NO_TRADE_QUEUEING: &str = "THOST_FTDC_OST_NoTradeQueueing";
/// Declared order status of a fully traded order.
pub const OST_ALL_TRADED: &str = "THOST_FTDC_OST_AllTraded";

/// Path of the bundled trader declarations.
pub fn declarations_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("decl/ctp_trader.bind.toml")
}

/// Work for the callback thread.
#[derive(Debug, Clone)]
enum Event {
    Connected,
    HeartBeat(i32),
    Login {
        broker: String,
        user: String,
        request_id: i32,
    },
    Order {
        order: Record,
        request_id: i32,
    },
    QueryAccount {
        broker: String,
        investor: String,
        request_id: i32,
    },
    Disconnected(i32),
    Stop,
}

/// The mock trader library.
pub struct MockCtpLibrary {
    marshaler: Marshaler,
    instances: Mutex<Vec<Arc<MockTraderApi>>>,
}

impl MockCtpLibrary {
    pub fn new(model: Arc<DeclarationModel>) -> Result<Self, MarshalError> {
        Ok(Self {
            marshaler: Marshaler::new(model)?,
            instances: Mutex::new(Vec::new()),
        })
    }

    /// Every instance created so far, oldest first.
    pub fn instances(&self) -> Vec<Arc<MockTraderApi>> {
        self.instances.lock().clone()
    }
}

impl NativeLibrary for MockCtpLibrary {
    fn create(
        &self,
        class: &str,
        constructor: &str,
        args: &[NativeArg],
    ) -> Result<Arc<dyn NativeApi>, NativeFault> {
        if (class, constructor) != (API_CLASS, "CreateFtdcTraderApi") {
            return Err(NativeFault::new(format!("no factory {class}::{constructor}")));
        }
        let flow_path = match args {
            [NativeArg::Text(path)] => String::from_utf8_lossy(path).into_owned(),
            [NativeArg::Null] | [] => String::new(),
            other => {
                let detail = format!("bad factory arguments: {} given", other.len());
                return Err(NativeFault::new(detail));
            }
        };
        let api = Arc::new(MockTraderApi::new(self.marshaler.clone(), flow_path));
        self.instances.lock().push(api.clone());
        Ok(api)
    }

    fn call_static(
        &self,
        class: &str,
        method: &str,
        _args: &[NativeArg],
    ) -> Result<NativeArg, NativeFault> {
        match (class, method) {
            (API_CLASS, "GetApiVersion") => Ok(NativeArg::Text(API_VERSION.as_bytes().to_vec())),
            _ => Err(NativeFault::new(format!("no static {class}::{method}"))),
        }
    }
}

/// State shared with the callback thread.
struct Shared {
    marshaler: Marshaler,
    spi: Mutex<Option<Arc<dyn NativeSpi>>>,
    stopped: AtomicBool,
    delivered: AtomicUsize,
    session_id: i32,
}

/// One trader instance.
pub struct MockTraderApi {
    shared: Arc<Shared>,
    flow_path: String,
    fronts: Mutex<Vec<String>>,
    requests: Mutex<Vec<String>>,
    events: Mutex<Option<Sender<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MockTraderApi {
    fn new(marshaler: Marshaler, flow_path: String) -> Self {
        Self {
            shared: Arc::new(Shared {
                marshaler,
                spi: Mutex::new(None),
                stopped: AtomicBool::new(false),
                delivered: AtomicUsize::new(0),
                session_id: 42,
            }),
            flow_path,
            fronts: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn flow_path(&self) -> &str {
        &self.flow_path
    }

    pub fn fronts(&self) -> Vec<String> {
        self.fronts.lock().clone()
    }

    /// Names of accepted requests, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Number of callbacks handed to the registered Spi.
    pub fn delivered(&self) -> usize {
        self.shared.delivered.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Simulate a heartbeat timeout report from the front.
    pub fn heartbeat_warning(&self, lapse: i32) -> bool {
        self.push(Event::HeartBeat(lapse))
    }

    /// Simulate the front dropping the connection.
    pub fn disconnect(&self, reason: i32) -> bool {
        self.push(Event::Disconnected(reason))
    }

    fn push(&self, event: Event) -> bool {
        match self.events.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Queue a request; `0` on success, `-1` when the instance is not running.
    fn submit(&self, name: &str, event: Event) -> NativeArg {
        if !self.push(event) {
            return NativeArg::Scalar(Scalar::I32(-1));
        }
        self.requests.lock().push(name.to_string());
        NativeArg::Scalar(Scalar::I32(0))
    }

    fn request(&self, method: &str, args: &[NativeArg]) -> Result<(Record, i32), NativeFault> {
        match args {
            [NativeArg::Struct(body), NativeArg::Scalar(Scalar::I32(request_id))] => {
                let record = self
                    .shared
                    .marshaler
                    .decode_struct(body)
                    .map_err(|e| NativeFault::new(format!("{method}: {e}")))?;
                Ok((record, *request_id))
            }
            _ => Err(NativeFault::with_code(-2, format!("{method}: malformed request"))),
        }
    }
}

fn text(record: &Record, field: &str) -> String {
    record.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

impl NativeApi for MockTraderApi {
    fn register_spi(&self, spi: Arc<dyn NativeSpi>) -> Result<(), NativeFault> {
        *self.shared.spi.lock() = Some(spi);
        Ok(())
    }

    fn init(&self) -> Result<(), NativeFault> {
        if self.is_released() {
            return Err(NativeFault::new("instance released"));
        }
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        let (tx, rx) = channel::unbounded();
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("mock-ctp-callback".to_string())
            .spawn(move || run_callbacks(shared, rx))
            .map_err(|e| NativeFault::new(format!("spawning callback thread: {e}")))?;
        // the front answers as soon as the worker is up
        let _ = tx.send(Event::Connected);
        *self.events.lock() = Some(tx);
        *worker = Some(handle);
        Ok(())
    }

    fn release(&self) -> Result<(), NativeFault> {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(tx) = self.events.lock().take() {
            let _ = tx.send(Event::Stop);
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            // released from one of our own callbacks: the loop exits on its own
            if handle.thread().id() != thread::current().id() {
                handle
                    .join()
                    .map_err(|_| NativeFault::new("callback thread panicked"))?;
            }
        }
        self.shared.spi.lock().take();
        tracing::debug!(flow_path = %self.flow_path, "mock trader released");
        Ok(())
    }

    fn call(&self, method: &str, args: &[NativeArg]) -> Result<NativeArg, NativeFault> {
        match method {
            "GetTradingDay" => Ok(NativeArg::Text(TRADING_DAY.as_bytes().to_vec())),
            "RegisterFront" => match args {
                [NativeArg::Text(address)] if !address.is_empty() => {
                    self.fronts.lock().push(String::from_utf8_lossy(address).into_owned());
                    Ok(NativeArg::Void)
                }
                _ => Err(NativeFault::with_code(-1, "front address required")),
            },
            "ReqUserLogin" => {
                let (login, request_id) = self.request(method, args)?;
                let event = Event::Login {
                    broker: text(&login, "BrokerID"),
                    user: text(&login, "UserID"),
                    request_id,
                };
                Ok(self.submit(method, event))
            }
            "ReqOrderInsert" => {
                let (order, request_id) = self.request(method, args)?;
                Ok(self.submit(method, Event::Order { order, request_id }))
            }
            "ReqQryTradingAccount" => {
                let (query, request_id) = self.request(method, args)?;
                let event = Event::QueryAccount {
                    broker: text(&query, "BrokerID"),
                    investor: text(&query, "InvestorID"),
                    request_id,
                };
                Ok(self.submit(method, event))
            }
            other => Err(NativeFault::new(format!("unsupported request {other}"))),
        }
    }
}

impl Drop for MockTraderApi {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

fn run_callbacks(shared: Arc<Shared>, events: Receiver<Event>) {
    for event in events.iter() {
        if matches!(event, Event::Stop) || shared.stopped.load(Ordering::SeqCst) {
            break;
        }
        let callbacks = match shared.callbacks(&event) {
            Ok(callbacks) => callbacks,
            Err(e) => {
                tracing::warn!("mock trader could not build callbacks for {event:?}: {e}");
                continue;
            }
        };
        for (hook, args) in callbacks {
            if shared.stopped.load(Ordering::SeqCst) {
                return;
            }
            let spi = shared.spi.lock().clone();
            if let Some(spi) = spi {
                spi.invoke(hook, &args);
                shared.delivered.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

type Callback = (&'static str, Vec<NativeArg>);

/// Input order fields echoed into every order return.
const ORDER_ECHO_FIELDS: [&str; 6] =
    ["BrokerID", "InvestorID", "InstrumentID", "OrderRef", "Direction", "LimitPrice"];

impl Shared {
    fn record(&self, name: &str, fields: &[(&str, Value)]) -> Result<NativeArg, MarshalError> {
        let mut record = self.marshaler.new_record(name)?;
        for (field, value) in fields {
            record.set(field, value.clone())?;
        }
        Ok(NativeArg::Struct(self.marshaler.encode_struct(&record)?))
    }

    /// Text of a declared character constant.
    fn constant_text(&self, name: &str) -> Result<String, MarshalError> {
        let value = self.marshaler.model().constant(name).map(|c| &c.value);
        match value.and_then(ConstValue::as_text) {
            Some(text) => Ok(text.to_string()),
            None => Err(MarshalError::TypeMismatch {
                path: name.to_string(),
                expected: "text constant".to_string(),
                found: value.map_or_else(|| "nothing".to_string(), ToString::to_string),
            }),
        }
    }

    fn rsp_info(&self, error_id: i32, message: &str) -> Result<NativeArg, MarshalError> {
        self.record(
            "CThostFtdcRspInfoField",
            &[("ErrorID", Value::from(error_id)), ("ErrorMsg", Value::from(message))],
        )
    }

    fn callbacks(&self, event: &Event) -> Result<Vec<Callback>, MarshalError> {
        let int = |v: i32| NativeArg::Scalar(Scalar::I32(v));
        let last = NativeArg::Scalar(Scalar::Bool(true));
        let callbacks = match event {
            Event::Connected => vec![("OnFrontConnected", vec![])],
            Event::HeartBeat(lapse) => vec![("OnHeartBeatWarning", vec![int(*lapse)])],
            Event::Disconnected(reason) => vec![("OnFrontDisconnected", vec![int(*reason)])],
            Event::Login {
                broker,
                user,
                request_id,
            } => {
                if user.is_empty() {
                    let info = self.rsp_info(ERR_INVALID_LOGIN, "CTP:invalid login")?;
                    vec![("OnRspUserLogin", vec![NativeArg::Null, info, int(*request_id), last])]
                } else {
                    let rsp = self.record(
                        "CThostFtdcRspUserLoginField",
                        &[
                            ("TradingDay", Value::from(TRADING_DAY)),
                            ("LoginTime", Value::from("09:00:01")),
                            ("BrokerID", Value::from(broker.as_str())),
                            ("UserID", Value::from(user.as_str())),
                            ("FrontID", Value::from(1)),
                            ("SessionID", Value::from(self.session_id)),
                            ("MaxOrderRef", Value::from("1")),
                        ],
                    )?;
                    let info = self.rsp_info(0, "CTP:no error")?;
                    vec![("OnRspUserLogin", vec![rsp, info, int(*request_id), last])]
                }
            }
            Event::Order { order, request_id } => {
                let volume = order.get("VolumeTotalOriginal").and_then(Value::as_i64).unwrap_or(0);
                if volume <= 0 {
                    let echo = NativeArg::Struct(self.marshaler.encode_struct(order)?);
                    let info = self.rsp_info(15, "CTP:invalid volume")?;
                    return Ok(vec![("OnRspOrderInsert", vec![echo, info, int(*request_id), last])]);
                }
                let mut out = Vec::new();
                let accepted = self.constant_text(OST_NO_TRADE_QUEUEING)?;
                let filled = self.constant_text(OST_ALL_TRADED)?;
                for (status, traded, sys_id) in [(accepted, 0, ""), (filled, volume, "100001")] {
                    let mut rtn = self.marshaler.new_record("CThostFtdcOrderField")?;
                    for field in ORDER_ECHO_FIELDS {
                        if let Some(value) = order.get(field) {
                            rtn.set(field, value.clone())?;
                        }
                    }
                    rtn.set("VolumeTotalOriginal", volume)?;
                    rtn.set("VolumeTraded", traded)?;
                    rtn.set("OrderStatus", status)?;
                    rtn.set("OrderSysID", sys_id)?;
                    rtn.set("FrontID", 1)?;
                    rtn.set("SessionID", self.session_id)?;
                    let rtn = NativeArg::Struct(self.marshaler.encode_struct(&rtn)?);
                    out.push(("OnRtnOrder", vec![rtn]));
                }
                out
            }
            Event::QueryAccount {
                broker,
                investor,
                request_id,
            } => {
                let account = self.record(
                    "CThostFtdcTradingAccountField",
                    &[
                        ("BrokerID", Value::from(broker.as_str())),
                        ("AccountID", Value::from(investor.as_str())),
                        ("Balance", Value::Float(1_000_000.0)),
                        ("Available", Value::Float(850_000.0)),
                        ("CurrMargin", Value::Float(150_000.0)),
                        ("CurrencyID", Value::from("CNY")),
                    ],
                )?;
                let args = vec![account, NativeArg::Null, int(*request_id), last];
                vec![("OnRspQryTradingAccount", args)]
            }
            Event::Stop => Vec::new(),
        };
        Ok(callbacks)
    }
}
