//! End to end: declarations → generated module → loaded bindings → mock
//! trader library with callbacks on its own thread.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use mock_ctp::{
    declarations_path, MockCtpLibrary, MockTraderApi, API_VERSION, ERR_INVALID_LOGIN,
    OST_ALL_TRADED, OST_NO_TRADE_QUEUEING, TRADING_DAY,
};
use spibind_bridge::{
    ApiObject, BridgeError, CallError, LoadedModule, ScriptError, ScriptObject, ScriptRuntime,
};
use spibind_core::DeclarationModel;
use spibind_gen::{generate_module, GeneratorOptions, Module, SURFACE_FILE};
use spibind_marshal::{MarshalError, Record, Value};

const TIMEOUT: Duration = Duration::from_secs(5);

fn options() -> GeneratorOptions {
    GeneratorOptions {
        strip_prefix: Some("CThostFtdc".into()),
        ignore_unsupported: true,
        ..Default::default()
    }
}

struct Session {
    module: Arc<LoadedModule>,
    library: Arc<MockCtpLibrary>,
    runtime: Arc<ScriptRuntime>,
}

impl Session {
    fn start() -> Self {
        let model = Arc::new(DeclarationModel::load(&declarations_path()).unwrap());
        let module = generate_module(&model, &options()).unwrap();
        Self::load(module, model)
    }

    fn load(module: Module, model: Arc<DeclarationModel>) -> Self {
        let library = Arc::new(MockCtpLibrary::new(model.clone()).unwrap());
        let runtime = ScriptRuntime::new();
        let module = LoadedModule::load(module, model, library.clone(), runtime.clone()).unwrap();
        Self {
            module: Arc::new(module),
            library,
            runtime,
        }
    }

    fn trader(&self) -> (ApiObject, Arc<MockTraderApi>) {
        let api = self.module.create_api("TraderApi", &[Value::from("flow/")]).unwrap();
        let native = self.library.instances().pop().unwrap();
        (api, native)
    }

    fn record(&self, name: &str, fields: &[(&str, Value)]) -> Record {
        let mut record = self.module.new_record(name).unwrap();
        for (field, value) in fields {
            record.set(field, value.clone()).unwrap();
        }
        record
    }
}

fn field<'r>(record: &'r Value, name: &str) -> &'r Value {
    record.as_record().and_then(|r| r.get(name)).unwrap_or(&Value::Null)
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        assert!(start.elapsed() < TIMEOUT, "timed out waiting for callbacks");
        thread::sleep(Duration::from_millis(5));
    }
}

fn trader_handler(
    module: Arc<LoadedModule>,
    api: ApiObject,
    tx: Sender<String>,
) -> Arc<ScriptObject> {
    let connected = tx.clone();
    let login = tx.clone();
    let order = tx.clone();
    ScriptObject::builder("Trader")
        .method("OnFrontConnected", move |ctx, _| {
            let req = module
                .new_record("ReqUserLoginField")?
                .with("BrokerID", "9999")?
                .with("UserID", "000001")?
                .with("Password", "secret")?;
            let status = api.invoke("ReqUserLogin", &[Value::Record(req), Value::Int(1)])?;
            ctx.bump("connects", 1);
            let _ = connected.send(format!("connected {}", status.as_i64().unwrap_or(-99)));
            Ok(Value::Null)
        })
        .method("OnRspUserLogin", move |_, args| {
            let user = field(&args[0], "UserID").as_str().unwrap_or("-").to_string();
            let session = field(&args[0], "SessionID").as_i64().unwrap_or(-1);
            let error = field(&args[1], "ErrorID").as_i64().unwrap_or(-1);
            let request = args[2].as_i64().unwrap_or(-1);
            let _ = login.send(format!("login {user} {error} session {session} req {request}"));
            Ok(Value::Null)
        })
        .method("OnRtnOrder", move |_, args| {
            let o = &args[0];
            let _ = order.send(format!(
                "order {} {} {}",
                field(o, "OrderRef").as_str().unwrap_or("-"),
                field(o, "OrderStatus").as_str().unwrap_or("-"),
                field(o, "VolumeTraded").as_i64().unwrap_or(-1),
            ));
            Ok(Value::Null)
        })
        .method("OnRspQryTradingAccount", move |_, args| {
            let balance = field(&args[0], "Balance").as_f64().unwrap_or(-1.0);
            let currency = field(&args[0], "CurrencyID").as_str().unwrap_or("-").to_string();
            let info_is_null = args[1].is_null();
            let _ = tx.send(format!("account {balance} {currency} {info_is_null}"));
            Ok(Value::Null)
        })
        .build()
}

fn next(rx: &Receiver<String>) -> String {
    rx.recv_timeout(TIMEOUT).expect("callback did not arrive")
}

#[test]
fn trading_session_round_trip() {
    let s = Session::start();
    let (api, native) = s.trader();
    assert_eq!(native.flow_path(), "flow/");
    assert_eq!(
        s.module.call_static("TraderApi", "GetApiVersion", &[]).unwrap(),
        Value::from(API_VERSION)
    );
    api.invoke("RegisterFront", &[Value::from("tcp://127.0.0.1:41205")]).unwrap();
    assert_eq!(native.fronts(), ["tcp://127.0.0.1:41205"]);

    let (tx, rx) = channel::unbounded();
    let handler = trader_handler(s.module.clone(), api.clone(), tx);
    let spi = s.module.new_spi("TraderSpi", &handler).unwrap();
    api.register_spi(&spi).unwrap();
    api.init().unwrap();

    // login is requested from inside OnFrontConnected on the callback thread
    assert_eq!(next(&rx), "connected 0");
    assert_eq!(next(&rx), "login 000001 0 session 42 req 1");

    let order = s.record(
        "InputOrderField",
        &[
            ("BrokerID", Value::from("9999")),
            ("InvestorID", Value::from("000001")),
            ("InstrumentID", Value::from("IF2611")),
            ("OrderRef", Value::from("1")),
            ("Direction", s.module.constant("THOST_FTDC_D_Buy").unwrap()),
            ("LimitPrice", Value::Float(3800.2)),
            ("VolumeTotalOriginal", Value::Int(2)),
        ],
    );
    let status = api.invoke("ReqOrderInsert", &[Value::Record(order), Value::Int(2)]).unwrap();
    assert_eq!(status, Value::Int(0));
    let status = |name: &str| s.module.constant(name).unwrap().as_str().unwrap().to_string();
    assert_eq!(next(&rx), format!("order 1 {} 0", status(OST_NO_TRADE_QUEUEING)));
    assert_eq!(next(&rx), format!("order 1 {} 2", status(OST_ALL_TRADED)));

    let query = s.record("QryTradingAccountField", &[("InvestorID", Value::from("000001"))]);
    api.invoke("ReqQryTradingAccount", &[Value::Record(query), Value::Int(3)]).unwrap();
    assert_eq!(next(&rx), "account 1000000 CNY true");

    assert_eq!(api.invoke("GetTradingDay", &[]).unwrap(), Value::from(TRADING_DAY));
    assert_eq!(native.requests(), ["ReqUserLogin", "ReqOrderInsert", "ReqQryTradingAccount"]);
    assert_eq!(s.runtime.enter(|ctx| ctx.get("connects").cloned()).unwrap(), Some(Value::Int(1)));

    api.release().unwrap();
    assert!(native.is_released());
    assert!(matches!(api.invoke("GetTradingDay", &[]), Err(CallError::Released { .. })));
    assert!(s.runtime.drain_faults().is_empty());
}

#[test]
fn handler_without_overrides_survives_every_hook() {
    let s = Session::start();
    let (api, native) = s.trader();
    let handler = ScriptObject::builder("Silent").build();
    let spi = s.module.new_spi("TraderSpi", &handler).unwrap();
    api.register_spi(&spi).unwrap();
    api.init().unwrap();

    assert!(native.heartbeat_warning(30));
    let login = s.record("ReqUserLoginField", &[("UserID", Value::from("000001"))]);
    api.invoke("ReqUserLogin", &[Value::Record(login), Value::Int(1)]).unwrap();
    assert!(native.disconnect(0x1001));

    // connected, heartbeat, login response, disconnected
    wait_until(|| native.delivered() == 4);
    api.release().unwrap();
    assert!(s.runtime.drain_faults().is_empty());
}

#[test]
fn rejected_login_delivers_null_response() {
    let s = Session::start();
    let (api, _native) = s.trader();
    let (tx, rx) = channel::unbounded();
    let handler = ScriptObject::builder("Login")
        .method("OnRspUserLogin", move |_, args| {
            let error = field(&args[1], "ErrorID").as_i64().unwrap_or(-1);
            let message = field(&args[1], "ErrorMsg").as_str().unwrap_or("-").to_string();
            let _ = tx.send(format!("{} {error} {message}", args[0].is_null()));
            Ok(Value::Null)
        })
        .build();
    let spi = s.module.new_spi("TraderSpi", &handler).unwrap();
    api.register_spi(&spi).unwrap();
    api.init().unwrap();

    let login = s.record("ReqUserLoginField", &[("BrokerID", Value::from("9999"))]);
    api.invoke("ReqUserLogin", &[Value::Record(login), Value::Int(7)]).unwrap();
    assert_eq!(next(&rx), format!("true {ERR_INVALID_LOGIN} CTP:invalid login"));
}

#[test]
fn over_wide_text_fails_before_reaching_the_library() {
    let s = Session::start();
    let (api, native) = s.trader();
    api.init().unwrap();
    let order = s.record(
        "InputOrderField",
        &[("InstrumentID", Value::from("X".repeat(32))), ("VolumeTotalOriginal", Value::Int(1))],
    );
    let err = api.invoke("ReqOrderInsert", &[Value::Record(order), Value::Int(1)]).unwrap_err();
    assert!(matches!(
        err,
        CallError::Marshal(MarshalError::ValueTooLong { max_len: 31, actual: 32, .. })
    ));
    assert!(native.requests().is_empty());

    let err = api.invoke("RegisterFront", &[Value::from("")]).unwrap_err();
    assert!(matches!(err, CallError::NativeCall { code: Some(-1), .. }));
}

#[test]
fn requests_before_init_report_network_failure() {
    let s = Session::start();
    let (api, native) = s.trader();
    let login = s.record("ReqUserLoginField", &[("UserID", Value::from("000001"))]);
    let status = api.invoke("ReqUserLogin", &[Value::Record(login), Value::Int(1)]).unwrap();
    assert_eq!(status, Value::Int(-1));
    assert!(native.requests().is_empty());
}

#[test]
fn handler_error_is_reported_and_delivery_continues() {
    let s = Session::start();
    let (api, native) = s.trader();
    let (tx, rx) = channel::unbounded();
    let handler = ScriptObject::builder("Flaky")
        .method("OnFrontConnected", |_, _| Err(ScriptError::raise("not ready")))
        .method("OnHeartBeatWarning", move |_, args| {
            let _ = tx.send(format!("heartbeat {}", args[0].as_i64().unwrap_or(-1)));
            Ok(Value::Null)
        })
        .build();
    let spi = s.module.new_spi("TraderSpi", &handler).unwrap();
    api.register_spi(&spi).unwrap();
    api.init().unwrap();
    native.heartbeat_warning(12);

    assert_eq!(next(&rx), "heartbeat 12");
    let faults = s.runtime.drain_faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].interface, "CThostFtdcTraderSpi");
    assert_eq!(
        faults[0].error,
        BridgeError::Handler {
            method: "OnFrontConnected".into(),
            message: "not ready".into()
        }
    );
}

#[test]
fn release_from_callback_stops_delivery() {
    let s = Session::start();
    let (api, native) = s.trader();
    let (tx, rx) = channel::unbounded();
    let handler = {
        let api = api.clone();
        let released = tx.clone();
        ScriptObject::builder("Quitter")
            .method("OnHeartBeatWarning", move |_, _| {
                api.release()?;
                let _ = released.send("released".to_string());
                Ok(Value::Null)
            })
            .method("OnFrontDisconnected", move |_, _| {
                let _ = tx.send("disconnected".to_string());
                Ok(Value::Null)
            })
            .build()
    };
    let spi = s.module.new_spi("TraderSpi", &handler).unwrap();
    api.register_spi(&spi).unwrap();
    api.init().unwrap();
    native.heartbeat_warning(5);
    native.disconnect(1);

    assert_eq!(next(&rx), "released");
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(api.is_released());
    assert!(native.is_released());
    assert!(s.runtime.drain_faults().is_empty());
}

fn heartbeat_recorder(tx: Sender<String>) -> Arc<ScriptObject> {
    ScriptObject::builder("Beats")
        .method("OnHeartBeatWarning", move |_, args| {
            let _ = tx.send(format!("heartbeat {}", args[0].as_i64().unwrap_or(-1)));
            Ok(Value::Null)
        })
        .build()
}

#[test]
fn release_inside_runtime_with_callback_pending() {
    let s = Session::start();
    let (api, native) = s.trader();
    let (tx, rx) = channel::unbounded();
    let handler = heartbeat_recorder(tx);
    let spi = s.module.new_spi("TraderSpi", &handler).unwrap();
    api.register_spi(&spi).unwrap();
    api.init().unwrap();
    wait_until(|| native.delivered() == 1);

    let (done_tx, done_rx) = channel::bounded(1);
    {
        let (runtime, native) = (s.runtime.clone(), native.clone());
        thread::spawn(move || {
            let released = runtime.enter(|_| {
                native.heartbeat_warning(1);
                // the callback thread is now waiting for the lock
                thread::sleep(Duration::from_millis(100));
                api.release()
            });
            let _ = done_tx.send(released);
        });
    }
    let released = done_rx
        .recv_timeout(TIMEOUT)
        .expect("release inside the runtime never returned");
    assert_eq!(released, Ok(Ok(())));
    assert!(native.is_released());
    assert!(rx.try_recv().is_err());
    assert!(s.runtime.drain_faults().is_empty());
}

#[test]
fn handler_releases_another_api_with_callback_pending() {
    let s = Session::start();
    let (api_a, native_a) = s.trader();
    let (api_b, native_b) = s.trader();
    let (tx, rx) = channel::unbounded();

    let handler_b = heartbeat_recorder(tx.clone());
    let spi_b = s.module.new_spi("TraderSpi", &handler_b).unwrap();
    api_b.register_spi(&spi_b).unwrap();

    let handler_a = {
        let (api_b, native_b) = (api_b.clone(), native_b.clone());
        ScriptObject::builder("Closer")
            .method("OnHeartBeatWarning", move |_, _| {
                native_b.heartbeat_warning(2);
                thread::sleep(Duration::from_millis(100));
                api_b.release()?;
                let _ = tx.send("released b".to_string());
                Ok(Value::Null)
            })
            .build()
    };
    let spi_a = s.module.new_spi("TraderSpi", &handler_a).unwrap();
    api_a.register_spi(&spi_a).unwrap();

    api_a.init().unwrap();
    api_b.init().unwrap();
    wait_until(|| native_a.delivered() == 1 && native_b.delivered() == 1);

    native_a.heartbeat_warning(1);
    assert_eq!(next(&rx), "released b");
    assert!(api_b.is_released());
    assert!(native_b.is_released());
    // B's heartbeat was abandoned, not delivered late
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(s.runtime.drain_faults().is_empty());
    api_a.release().unwrap();
}

#[test]
fn generated_files_reload_from_surface() {
    let model = Arc::new(DeclarationModel::load(&declarations_path()).unwrap());
    let module = generate_module(&model, &options()).unwrap();
    let dir = tempfile::tempdir().unwrap();
    module.to_files(options().lines_per_file()).unwrap().output(dir.path(), true).unwrap();

    let root = std::fs::read_to_string(dir.path().join("module.rs")).unwrap();
    assert!(root.contains("pub const THOST_FTDC_OST_AllTraded: &str = \"0\";"));
    assert!(root.contains("pub const THOST_TERT_QUICK: i64 = 2;"));
    let mut source = String::new();
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "rs") {
            source.push_str(&std::fs::read_to_string(path).unwrap());
        }
    }
    assert!(source.contains("pub struct TraderApi(pub ApiObject);"));
    assert!(source.contains("pub struct TraderSpi;"));

    let surface = std::fs::read_to_string(dir.path().join(SURFACE_FILE)).unwrap();
    let reloaded = Module::from_surface_json(&surface).unwrap();
    assert_eq!(reloaded.fingerprint(), module.fingerprint());
    let api = reloaded.class("TraderApi").unwrap();
    assert_eq!(api.skipped[0].name, "GetHandle");

    assert_eq!(reloaded.constants(), module.constants());

    let s = Session::load(reloaded, model);
    assert_eq!(s.module.constant("THOST_TERT_RESUME"), Some(Value::Int(1)));
    assert_eq!(s.module.constant("THOST_FTDC_VERSION"), None);
    let (api, _) = s.trader();
    assert_eq!(api.invoke("GetTradingDay", &[]).unwrap(), Value::from(TRADING_DAY));
}
