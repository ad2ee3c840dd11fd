//! Per-class binding generation.
//!
//! Turns each [`ClassDecl`] into a [`WrapperBinding`]:
//! - non-interface classes get one trampoline per method, with static
//!   factories returning the class itself promoted to constructors
//! - interface classes get one override slot per overridable hook,
//!   inherited hooks included, base class first
//!
//! Declared constants pass through unchanged unless `expose_constants` is
//! off or a name filter drops them.
//!
//! Every parameter and return type must have a marshaling rule; otherwise
//! generation fails, or the method is skipped and reported when
//! `ignore_unsupported` is set.

use spibind_core::{ClassDecl, DeclarationModel, MethodDecl, StructDecl, TypeRef};
use spibind_marshal::{select_rule, MarshalRule};

use crate::binding::{
    ConstantBinding, OverrideSlot, ParamBinding, RecordBinding, RecordField, SkippedMethod,
    Trampoline, TrampolineKind, WrapperBinding,
};
use crate::emit;
use crate::error::{GenError, Result};
use crate::policy::{GeneratorOptions, SymbolFilter};

/// Generate the binding of one class.
pub fn generate(
    model: &DeclarationModel,
    class: &ClassDecl,
    options: &GeneratorOptions,
) -> Result<WrapperBinding> {
    Generator::new(model, options)?.generate(class)
}

/// Binding generator over one declaration model.
pub struct Generator<'m> {
    model: &'m DeclarationModel,
    options: &'m GeneratorOptions,
    filter: SymbolFilter,
}

enum Member {
    Constructor(Trampoline),
    Method(Trampoline),
    Override(OverrideSlot),
    Omitted,
}

impl<'m> Generator<'m> {
    pub fn new(model: &'m DeclarationModel, options: &'m GeneratorOptions) -> Result<Self> {
        Ok(Self {
            model,
            options,
            filter: options.compile_filters()?,
        })
    }

    pub fn model(&self) -> &'m DeclarationModel {
        self.model
    }

    pub fn options(&self) -> &'m GeneratorOptions {
        self.options
    }

    pub fn is_class_generated(&self, name: &str) -> bool {
        self.model.find_class(name).is_some() && !self.filter.is_ignored(name)
    }

    pub fn is_struct_generated(&self, name: &str) -> bool {
        self.model.find_struct(name).is_some() && !self.filter.is_ignored(name)
    }

    /// Bindings for every generated class and struct, in declaration order.
    pub fn generate_all(&self) -> Result<(Vec<WrapperBinding>, Vec<RecordBinding>)> {
        let mut classes = Vec::new();
        for class in self.model.classes() {
            if self.filter.is_ignored(&class.name) {
                tracing::debug!(class = %class.name, "class ignored by name filter");
                continue;
            }
            classes.push(self.generate(class)?);
        }

        let mut records = Vec::new();
        for decl in self.model.structs() {
            if self.filter.is_ignored(&decl.name) {
                tracing::debug!(name = %decl.name, "struct ignored by name filter");
                continue;
            }
            records.push(self.generate_record(decl));
        }

        let skipped: usize = classes.iter().map(|c| c.skipped.len()).sum();
        tracing::info!(
            classes = classes.len(),
            records = records.len(),
            skipped,
            "bindings generated"
        );
        Ok((classes, records))
    }

    /// Constant bindings in name order.
    pub fn generate_constants(&self) -> Vec<ConstantBinding> {
        if !self.options.expose_constants {
            tracing::debug!(count = self.model.constants().len(), "constants not exposed");
            return Vec::new();
        }
        self.model
            .constants()
            .iter()
            .filter(|c| {
                let ignored = self.filter.is_ignored(&c.name);
                if ignored {
                    tracing::debug!(name = %c.name, "constant ignored by name filter");
                }
                !ignored
            })
            .map(|c| ConstantBinding {
                name: c.name.clone(),
                value: c.value.clone(),
            })
            .collect()
    }

    /// Generate the binding of one class.
    pub fn generate(&self, class: &ClassDecl) -> Result<WrapperBinding> {
        let mut binding = WrapperBinding {
            class_name: class.name.clone(),
            exposed_name: self.options.exposed_name(&class.name),
            is_interface: class.is_interface,
            constructors: Vec::new(),
            methods: Vec::new(),
            overrides: Vec::new(),
            skipped: Vec::new(),
            source: String::new(),
        };

        for method in self.model.all_methods(class) {
            let qualified = format!("{}::{}", class.name, method.name);
            if self.filter.is_ignored(&qualified) {
                tracing::debug!(method = %qualified, "method ignored by name filter");
                continue;
            }

            let member = if class.is_interface {
                self.hook(class, method, &qualified)
            } else {
                self.trampoline(class, method)
            };

            match member {
                Ok(Member::Constructor(t)) => binding.constructors.push(t),
                Ok(Member::Method(t)) => binding.methods.push(t),
                Ok(Member::Override(slot)) => binding.overrides.push(slot),
                Ok(Member::Omitted) => {}
                Err(GenError::UnsupportedType { ty, .. }) if self.options.ignore_unsupported => {
                    tracing::warn!(
                        method = %qualified,
                        %ty,
                        "skipping method with unsupported type"
                    );
                    binding.skipped.push(SkippedMethod {
                        name: method.name.clone(),
                        reason: format!("unsupported type {ty}"),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        binding.source = emit::class_source(&binding);
        Ok(binding)
    }

    /// Generate the record binding of one struct.
    pub fn generate_record(&self, decl: &StructDecl) -> RecordBinding {
        let mut record = RecordBinding {
            struct_name: decl.name.clone(),
            exposed_name: self.options.exposed_name(&decl.name),
            fields: decl
                .fields
                .iter()
                .map(|f| RecordField {
                    name: f.name.clone(),
                    ty: f.ty.clone(),
                })
                .collect(),
            source: String::new(),
        };
        record.source = emit::record_source(&record);
        record
    }

    fn hook(&self, class: &ClassDecl, method: &MethodDecl, qualified: &str) -> Result<Member> {
        if !method.is_overridable() {
            tracing::debug!(method = %qualified, "not overridable, no hook generated");
            return Ok(Member::Omitted);
        }
        if self.filter.is_no_callback(qualified) {
            tracing::debug!(method = %qualified, "callback disabled by name filter");
            return Ok(Member::Omitted);
        }
        Ok(Member::Override(OverrideSlot {
            name: method.name.clone(),
            params: self.params(class, method, None)?,
            return_rule: self.rule(class, method, &method.return_type, None)?,
            return_type: method.return_type.clone(),
            is_pure: method.is_pure,
        }))
    }

    fn trampoline(&self, class: &ClassDecl, method: &MethodDecl) -> Result<Member> {
        let returns_self = method.return_type.class_name() == Some(class.name.as_str());

        if method.is_static {
            let own = returns_self.then_some(class.name.as_str());
            let trampoline = self.build_trampoline(
                class,
                method,
                if returns_self { TrampolineKind::Constructor } else { TrampolineKind::Static },
                None,
                own,
            )?;
            return Ok(if returns_self {
                Member::Constructor(trampoline)
            } else {
                Member::Method(trampoline)
            });
        }

        if let Some(interface) = self.registered_interface(method) {
            let kind = TrampolineKind::RegisterSpi {
                interface: interface.to_string(),
            };
            let trampoline = self.build_trampoline(class, method, kind, Some(interface), None)?;
            return Ok(Member::Method(trampoline));
        }

        let kind = match (method.name.as_str(), method.params.is_empty()) {
            ("Init", true) => TrampolineKind::Init,
            ("Release", true) => TrampolineKind::Release,
            _ => TrampolineKind::Call,
        };
        Ok(Member::Method(self.build_trampoline(class, method, kind, None, None)?))
    }

    /// The interface a `RegisterSpi`-shaped method accepts, if any.
    fn registered_interface<'a>(&self, method: &'a MethodDecl) -> Option<&'a str> {
        match method.params.as_slice() {
            [only] => {
                let name = only.ty.class_name()?;
                let is_interface = self.model.find_class(name).is_some_and(|c| c.is_interface);
                (is_interface && self.is_class_generated(name)).then_some(name)
            }
            _ => None,
        }
    }

    fn build_trampoline(
        &self,
        class: &ClassDecl,
        method: &MethodDecl,
        kind: TrampolineKind,
        param_class: Option<&str>,
        return_class: Option<&str>,
    ) -> Result<Trampoline> {
        Ok(Trampoline {
            name: method.name.clone(),
            kind,
            params: self.params(class, method, param_class)?,
            return_rule: self.rule(class, method, &method.return_type, return_class)?,
            return_type: method.return_type.clone(),
        })
    }

    fn params(
        &self,
        class: &ClassDecl,
        method: &MethodDecl,
        allowed_class: Option<&str>,
    ) -> Result<Vec<ParamBinding>> {
        method
            .params
            .iter()
            .map(|p| {
                Ok(ParamBinding {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                    rule: self.rule(class, method, &p.ty, allowed_class)?,
                    default: p.default.clone(),
                })
            })
            .collect()
    }

    /// Marshaling rule of one type in one method.
    ///
    /// Object handles are only valid where `allowed_class` permits them;
    /// struct references must point at a generated record.
    fn rule(
        &self,
        class: &ClassDecl,
        method: &MethodDecl,
        ty: &TypeRef,
        allowed_class: Option<&str>,
    ) -> Result<MarshalRule> {
        let unsupported = |shown: String| GenError::UnsupportedType {
            class: class.name.clone(),
            method: method.name.clone(),
            ty: shown,
        };
        let rule = select_rule(ty).ok_or_else(|| unsupported(ty.to_string()))?;
        match &rule {
            MarshalRule::ObjectHandle(name) if allowed_class != Some(name.as_str()) => {
                Err(unsupported(ty.to_string()))
            }
            MarshalRule::StructLayout(name) if !self.is_struct_generated(name) => {
                Err(unsupported(format!("{ty} (not generated)")))
            }
            _ => Ok(rule),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spibind_core::PrimitiveKind;

    const DECL: &str = r#"
[library]
name = "ctp"

[typedefs]
TThostFtdcBrokerIDType = "char[11]"
TThostFtdcErrorMsgType = "char[81]"

[constants]
THOST_FTDC_OST_AllTraded = "0"
THOST_FTDC_OST_NoTradeQueueing = "3"
_THOST_PRIVATE_FLAG = 1

[[structs]]
name = "CThostFtdcRspInfoField"
fields = ["int ErrorID", "TThostFtdcErrorMsgType ErrorMsg"]

[[structs]]
name = "CThostFtdcReqUserLoginField"
fields = ["TThostFtdcBrokerIDType BrokerID"]

[[classes]]
name = "CThostFtdcTraderSpi"
interface = true
methods = [
    "virtual void OnFrontConnected(){};",
    "virtual void OnHeartBeatWarning(int nTimeLapse){};",
    "virtual void OnRspError(CThostFtdcRspInfoField *pRspInfo, int nRequestID, bool bIsLast) {};",
]

[[classes]]
name = "CThostFtdcTraderApi"
methods = [
    "static CThostFtdcTraderApi *CreateFtdcTraderApi(const char *pszFlowPath = \"\");",
    "static const char *GetApiVersion();",
    "virtual void Release() = 0;",
    "virtual void Init() = 0;",
    "virtual void RegisterSpi(CThostFtdcTraderSpi *pSpi) = 0;",
    "virtual int ReqUserLogin(CThostFtdcReqUserLoginField *pReq, int nRequestID) = 0;",
    "virtual void *GetHandle() = 0;",
]
"#;

    fn model() -> DeclarationModel {
        DeclarationModel::parse(DECL).unwrap()
    }

    #[test]
    fn unsupported_type_fails_generation() {
        let model = model();
        let api = model.find_class("CThostFtdcTraderApi").unwrap();
        match generate(&model, api, &GeneratorOptions::default()) {
            Err(GenError::UnsupportedType { class, method, .. }) => {
                assert_eq!(class, "CThostFtdcTraderApi");
                assert_eq!(method, "GetHandle");
            }
            other => panic!("expected UnsupportedType, got {other:?}"),
        }
    }

    #[test]
    fn api_trampolines_classified() {
        let model = model();
        let api = model.find_class("CThostFtdcTraderApi").unwrap();
        let options = GeneratorOptions {
            ignore_names: vec!["CThostFtdcTraderApi::GetHandle".into()],
            ..Default::default()
        };
        let binding = generate(&model, api, &options).unwrap();

        let ctor = binding.constructor("CreateFtdcTraderApi").unwrap();
        assert_eq!(ctor.kind, TrampolineKind::Constructor);
        assert_eq!(ctor.params[0].default.as_deref(), Some("\"\""));

        assert_eq!(binding.method("GetApiVersion").unwrap().kind, TrampolineKind::Static);
        assert_eq!(binding.method("Init").unwrap().kind, TrampolineKind::Init);
        assert_eq!(binding.method("Release").unwrap().kind, TrampolineKind::Release);
        assert_eq!(
            binding.method("RegisterSpi").unwrap().kind,
            TrampolineKind::RegisterSpi {
                interface: "CThostFtdcTraderSpi".into()
            }
        );
        let login = binding.method("ReqUserLogin").unwrap();
        assert_eq!(login.kind, TrampolineKind::Call);
        assert_eq!(login.return_rule, MarshalRule::Direct(PrimitiveKind::I32));
        assert!(binding.method("GetHandle").is_none());
        assert!(binding.overrides.is_empty());
    }

    #[test]
    fn ignore_unsupported_skips_and_reports() {
        let model = model();
        let api = model.find_class("CThostFtdcTraderApi").unwrap();
        let options = GeneratorOptions {
            ignore_unsupported: true,
            ..Default::default()
        };
        let binding = generate(&model, api, &options).unwrap();
        assert_eq!(binding.skipped.len(), 1);
        assert_eq!(binding.skipped[0].name, "GetHandle");
        assert!(binding.source.contains("// skipped GetHandle"));
    }

    #[test]
    fn interface_hooks_become_override_slots() {
        let model = model();
        let spi = model.find_class("CThostFtdcTraderSpi").unwrap();
        let binding = generate(&model, spi, &GeneratorOptions::default()).unwrap();
        let names: Vec<_> = binding.overrides.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["OnFrontConnected", "OnHeartBeatWarning", "OnRspError"]);
        assert!(binding.methods.is_empty());
        let err = binding.override_slot("OnRspError").unwrap();
        assert_eq!(err.params[0].rule, MarshalRule::StructLayout("CThostFtdcRspInfoField".into()));
        assert!(!err.is_pure);
    }

    #[test]
    fn no_callback_filter_makes_hook_final() {
        let model = model();
        let spi = model.find_class("CThostFtdcTraderSpi").unwrap();
        let options = GeneratorOptions {
            no_callback_names: vec![".*::OnHeartBeat.*".into()],
            ..Default::default()
        };
        let binding = generate(&model, spi, &options).unwrap();
        assert!(binding.override_slot("OnHeartBeatWarning").is_none());
        assert_eq!(binding.overrides.len(), 2);
    }

    #[test]
    fn ignored_struct_makes_its_users_unsupported() {
        let model = model();
        let spi = model.find_class("CThostFtdcTraderSpi").unwrap();
        let options = GeneratorOptions {
            ignore_names: vec!["CThostFtdcRspInfoField".into()],
            ..Default::default()
        };
        assert!(matches!(
            generate(&model, spi, &options),
            Err(GenError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn constants_follow_the_options() {
        let model = model();
        let all = GeneratorOptions::default();
        let gen = Generator::new(&model, &all).unwrap();
        let names: Vec<_> = gen.generate_constants().into_iter().map(|c| c.name).collect();
        assert_eq!(
            names,
            ["THOST_FTDC_OST_AllTraded", "THOST_FTDC_OST_NoTradeQueueing", "_THOST_PRIVATE_FLAG"]
        );

        let filtered = GeneratorOptions {
            ignore_underline_prefixed: true,
            ignore_names: vec![".*NoTrade".into()],
            ..Default::default()
        };
        let gen = Generator::new(&model, &filtered).unwrap();
        let kept = gen.generate_constants();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "THOST_FTDC_OST_AllTraded");
        assert_eq!(kept[0].value.as_text(), Some("0"));

        let hidden = GeneratorOptions {
            expose_constants: false,
            ..Default::default()
        };
        assert!(Generator::new(&model, &hidden).unwrap().generate_constants().is_empty());
    }

    #[test]
    fn generation_is_deterministic() {
        let model = model();
        let options = GeneratorOptions {
            ignore_unsupported: true,
            strip_prefix: Some("CThostFtdc".into()),
            ..Default::default()
        };
        let gen = Generator::new(&model, &options).unwrap();
        let first = gen.generate_all().unwrap();
        let second = gen.generate_all().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.0[0].fingerprint(), second.0[0].fingerprint());
        assert_eq!(first.0[1].exposed_name, "TraderApi");
    }
}
