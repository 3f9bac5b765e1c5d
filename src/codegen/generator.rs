//! Maps a reproduction slice into compilable test source.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;

use crate::analyzer::slice::ReproductionSlice;
use crate::codegen::statement::{
    ExpectedOutcome, GeneratedTest, Statement, StubSubstitution, TestManifest,
};
use crate::trace::record::{InvocationOutcome, InvocationRecord, TargetId};
use crate::trace::value::{
    FieldValue, PrimitiveValue, ValueIdentity, ValueRef, ValueShape, ValueSnapshot,
};

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    /// A recorded value has no constructible source mapping. Reported to
    /// the orchestrator, which downgrades the session instead of aborting.
    #[error("cannot construct value {identity} ({type_name}): {reason}")]
    UnsupportedConstruct {
        identity: ValueIdentity,
        type_name: String,
        reason: String,
    },

    #[error("slice references value {0} missing from its table")]
    MissingValue(ValueRef),

    #[error("slice carries no record for its failure point")]
    MissingFailureRecord,
}

/// Compiles reproduction slices into self-contained test units.
#[derive(Debug, Default)]
pub struct TestGenerator;

impl TestGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, slice: &ReproductionSlice) -> Result<GeneratedTest, GenerateError> {
        let failure = slice
            .failure_record()
            .ok_or(GenerateError::MissingFailureRecord)?;
        let name = test_name(&failure.target);

        let mut emitter = Emitter::new(slice);
        for record in slice.invocations() {
            emitter.emit_invocation(record)?;
        }

        let expected = emitter
            .expected
            .clone()
            .unwrap_or(ExpectedOutcome::Returns { value: None });
        let source = render_source(&name, &failure.target, &emitter);

        tracing::info!(
            test = %name,
            statements = emitter.statements.len(),
            stubs = emitter.stubs.len(),
            "generated test unit"
        );

        Ok(GeneratedTest {
            name: name.clone(),
            statements: emitter.statements,
            source,
            expected,
            manifest: TestManifest {
                test_name: name,
                session_id: slice.session_id(),
                generated_at: Utc::now(),
                failure_target: failure.target.qualified_name.clone(),
                stubs: emitter.stubs,
            },
        })
    }
}

struct Emitter<'a> {
    slice: &'a ReproductionSlice,
    /// identity → binding holding the materialized value. Aliased values
    /// are never re-constructed: a hit here is always reused.
    bindings: BTreeMap<ValueIdentity, String>,
    in_progress: BTreeSet<ValueIdentity>,
    statements: Vec<Statement>,
    stubs: Vec<StubSubstitution>,
    uses_stub: bool,
    uses_panic_capture: bool,
    expected: Option<ExpectedOutcome>,
}

impl<'a> Emitter<'a> {
    fn new(slice: &'a ReproductionSlice) -> Self {
        Self {
            slice,
            bindings: BTreeMap::new(),
            in_progress: BTreeSet::new(),
            statements: Vec::new(),
            stubs: Vec::new(),
            uses_stub: false,
            uses_panic_capture: false,
            expected: None,
        }
    }

    fn emit_invocation(&mut self, record: &InvocationRecord) -> Result<(), GenerateError> {
        if !record.is_complete() {
            // Context-only ancestor; nothing observable to replay.
            return Ok(());
        }

        let receiver = record
            .receiver
            .map(|r| self.materialize(r))
            .transpose()?;
        let arguments = record
            .arguments
            .iter()
            .map(|r| self.materialize(*r))
            .collect::<Result<Vec<_>, _>>()?;

        let call = match &receiver {
            Some(recv) => format!(
                "{recv}.{}({})",
                record.target.short_name(),
                arguments.join(", ")
            ),
            None => format!("{}({})", record.target.qualified_name, arguments.join(", ")),
        };

        let is_failure_point = record.id == self.slice.failure_point();

        match &record.outcome {
            InvocationOutcome::Returned { value: Some(value) } => {
                let result = format!("r{}", record.id.0);
                self.statements.push(Statement::Invoke {
                    binding: Some(result.clone()),
                    target: record.target.clone(),
                    call,
                });
                // The result materializes this identity for later statements.
                self.bindings.insert(value.identity, result.clone());

                match self.render_expected(*value)? {
                    Some(expected) => {
                        if is_failure_point {
                            self.expected = Some(ExpectedOutcome::Returns {
                                value: Some(expected.clone()),
                            });
                        }
                        self.statements.push(Statement::AssertReturned {
                            binding: result,
                            expected,
                        });
                    }
                    None => {
                        if is_failure_point {
                            self.expected = Some(ExpectedOutcome::Returns { value: None });
                        }
                    }
                }
            }
            InvocationOutcome::Returned { value: None } => {
                self.statements.push(Statement::Invoke {
                    binding: None,
                    target: record.target.clone(),
                    call,
                });
                if is_failure_point {
                    self.expected = Some(ExpectedOutcome::Returns { value: None });
                }
            }
            InvocationOutcome::Threw { error } => {
                self.uses_panic_capture = true;
                let failure_binding = format!("failure_{}", record.id.0);
                self.statements.push(Statement::InvokePanicking {
                    failure_binding: failure_binding.clone(),
                    target: record.target.clone(),
                    call,
                });
                self.statements.push(Statement::AssertThrew {
                    failure_binding,
                    error_kind: error.kind.clone(),
                });
                if is_failure_point {
                    self.expected = Some(ExpectedOutcome::Panics {
                        error_kind: error.kind.clone(),
                        message: error.message.clone(),
                    });
                }
            }
            InvocationOutcome::Incomplete => unreachable!("filtered above"),
        }
        Ok(())
    }

    /// Binding that holds the value behind `value_ref`, constructing it if
    /// no prior statement materialized the identity.
    fn materialize(&mut self, value_ref: ValueRef) -> Result<String, GenerateError> {
        if let Some(name) = self.bindings.get(&value_ref.identity) {
            return Ok(name.clone());
        }

        let snapshot = self.lookup(value_ref)?.clone();
        if !self.in_progress.insert(value_ref.identity) {
            return Err(GenerateError::UnsupportedConstruct {
                identity: value_ref.identity,
                type_name: String::new(),
                reason: "cyclic reference chain".to_string(),
            });
        }
        let result = self.materialize_snapshot(value_ref, &snapshot);
        self.in_progress.remove(&value_ref.identity);

        if let Ok(name) = &result {
            self.bindings.insert(value_ref.identity, name.clone());
        }
        result
    }

    fn materialize_snapshot(
        &mut self,
        value_ref: ValueRef,
        snapshot: &ValueSnapshot,
    ) -> Result<String, GenerateError> {
        let identity = value_ref.identity;
        match &snapshot.shape {
            ValueShape::Primitive { value } => {
                let name = format!("v{}", identity.0);
                self.statements.push(Statement::Construct {
                    binding: name.clone(),
                    expr: render_primitive(value),
                });
                Ok(name)
            }
            ValueShape::Ref { identity: other } => {
                let target_ref = self
                    .slice
                    .values()
                    .latest_ref(*other)
                    .ok_or(GenerateError::MissingValue(value_ref))?;
                self.materialize(target_ref)
            }
            ValueShape::Composite { type_name, fields } => {
                if type_name.is_empty() {
                    return Err(GenerateError::UnsupportedConstruct {
                        identity,
                        type_name: type_name.clone(),
                        reason: "composite has no constructible type name".to_string(),
                    });
                }
                let expr = self.render_composite(identity, type_name, fields)?;
                let name = format!("v{}", identity.0);
                self.statements.push(Statement::Construct {
                    binding: name.clone(),
                    expr,
                });
                Ok(name)
            }
            ValueShape::Unrepresentable { type_name, reason } => {
                let name = format!("v{}", identity.0);
                self.uses_stub = true;
                self.statements.push(Statement::ConstructStub {
                    binding: name.clone(),
                    type_name: type_name.clone(),
                });
                self.stubs.push(StubSubstitution {
                    identity,
                    type_name: type_name.clone(),
                    reason: reason.clone(),
                    binding: Some(name.clone()),
                });
                Ok(name)
            }
        }
    }

    fn render_composite(
        &mut self,
        owner: ValueIdentity,
        type_name: &str,
        fields: &[FieldValue],
    ) -> Result<String, GenerateError> {
        let mut parts = Vec::with_capacity(fields.len());
        for field in fields {
            let expr = self.render_field(owner, type_name, &field.shape)?;
            parts.push(format!("{}: {}", field.name, expr));
        }
        if parts.is_empty() {
            Ok(format!("{type_name} {{}}"))
        } else {
            Ok(format!("{type_name} {{ {} }}", parts.join(", ")))
        }
    }

    fn render_field(
        &mut self,
        owner: ValueIdentity,
        owner_type: &str,
        shape: &ValueShape,
    ) -> Result<String, GenerateError> {
        match shape {
            ValueShape::Primitive { value } => Ok(render_primitive(value)),
            ValueShape::Ref { identity } => {
                let target_ref = self
                    .slice
                    .values()
                    .latest_ref(*identity)
                    .ok_or(GenerateError::MissingValue(ValueRef::new(*identity, 0)))?;
                self.materialize(target_ref)
            }
            ValueShape::Composite { type_name, fields } => {
                if type_name.is_empty() {
                    return Err(GenerateError::UnsupportedConstruct {
                        identity: owner,
                        type_name: owner_type.to_string(),
                        reason: "nested composite has no constructible type name".to_string(),
                    });
                }
                self.render_composite(owner, type_name, fields)
            }
            ValueShape::Unrepresentable { type_name, .. } => {
                Err(GenerateError::UnsupportedConstruct {
                    identity: owner,
                    type_name: owner_type.to_string(),
                    reason: format!("field of unrepresentable type {type_name}"),
                })
            }
        }
    }

    /// Rendered expression for an expected return value, or `None` when the
    /// recorded value is unrepresentable and the equality check must be
    /// skipped (recorded in the manifest).
    fn render_expected(&mut self, value_ref: ValueRef) -> Result<Option<String>, GenerateError> {
        let snapshot = self.lookup(value_ref)?.clone();
        match &snapshot.shape {
            ValueShape::Unrepresentable { type_name, reason } => {
                self.stubs.push(StubSubstitution {
                    identity: value_ref.identity,
                    type_name: type_name.clone(),
                    reason: reason.clone(),
                    binding: None,
                });
                Ok(None)
            }
            ValueShape::Primitive { value } => Ok(Some(render_primitive(value))),
            ValueShape::Composite { type_name, fields } => {
                if fields.iter().any(|f| f.shape.contains_unrepresentable()) {
                    self.stubs.push(StubSubstitution {
                        identity: value_ref.identity,
                        type_name: type_name.clone(),
                        reason: "composite with unrepresentable fields".to_string(),
                        binding: None,
                    });
                    return Ok(None);
                }
                Ok(Some(self.render_composite(
                    value_ref.identity,
                    type_name,
                    fields,
                )?))
            }
            ValueShape::Ref { identity } => {
                let target_ref = self
                    .slice
                    .values()
                    .latest_ref(*identity)
                    .ok_or(GenerateError::MissingValue(value_ref))?;
                Ok(Some(self.materialize(target_ref)?))
            }
        }
    }

    fn lookup(&self, value_ref: ValueRef) -> Result<&ValueSnapshot, GenerateError> {
        self.slice
            .values()
            .resolve(value_ref)
            .or_else(|| self.slice.values().latest(value_ref.identity))
            .ok_or(GenerateError::MissingValue(value_ref))
    }
}

fn render_primitive(value: &PrimitiveValue) -> String {
    match value {
        PrimitiveValue::Unit => "()".to_string(),
        PrimitiveValue::Bool { value } => value.to_string(),
        PrimitiveValue::Int { value } => format!("{value}i64"),
        PrimitiveValue::Float { value } => {
            if value.is_finite() {
                format!("{value}f64")
            } else {
                format!("f64::from_bits(0x{:016x}u64)", value.to_bits())
            }
        }
        PrimitiveValue::Str { value } => format!("{value:?}.to_string()"),
        PrimitiveValue::Bytes { value } => {
            let bytes: Vec<String> = value.iter().map(|b| format!("{b}u8")).collect();
            format!("vec![{}]", bytes.join(", "))
        }
    }
}

fn test_name(target: &TargetId) -> String {
    let sanitized: String = target
        .short_name()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("reproduces_{}", sanitized.to_ascii_lowercase())
}

fn render_statement(statement: &Statement, out: &mut String) {
    match statement {
        Statement::Construct { binding, expr } => {
            out.push_str(&format!("    let {binding} = {expr};\n"));
        }
        Statement::ConstructStub { binding, type_name } => {
            out.push_str(&format!("    let {binding} = stub::<{type_name}>();\n"));
        }
        Statement::Invoke {
            binding: Some(binding),
            call,
            ..
        } => {
            out.push_str(&format!("    let {binding} = {call};\n"));
        }
        Statement::Invoke {
            binding: None,
            call,
            ..
        } => {
            out.push_str(&format!("    {call};\n"));
        }
        Statement::InvokePanicking {
            failure_binding,
            target,
            call,
        } => {
            out.push_str(&format!(
                "    let {failure_binding} = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {{ {call}; }}))\n"
            ));
            out.push_str(&format!(
                "        .expect_err(\"expected {} to fail\");\n",
                target.qualified_name
            ));
        }
        Statement::AssertReturned { binding, expected } => {
            out.push_str(&format!("    assert_eq!({binding}, {expected});\n"));
        }
        Statement::AssertThrew {
            failure_binding,
            error_kind,
        } => {
            out.push_str(&format!(
                "    let {failure_binding}_message = panic_message(&{failure_binding});\n"
            ));
            out.push_str(&format!(
                "    assert!({failure_binding}_message.contains({error_kind:?}), \"unexpected failure: {{{failure_binding}_message}}\");\n"
            ));
        }
    }
}

fn render_source(name: &str, failure_target: &TargetId, emitter: &Emitter<'_>) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "// Automatically generated regression test for {}.\n",
        failure_target.qualified_name
    ));
    out.push_str("// Derived from a recorded execution; regenerate from the session tape\n");
    out.push_str("// instead of editing by hand.\n\n");

    out.push_str("#[test]\n");
    out.push_str(&format!("fn {name}() {{\n"));
    for statement in &emitter.statements {
        render_statement(statement, &mut out);
    }
    out.push_str("}\n");

    if emitter.uses_panic_capture {
        out.push_str("\nfn panic_message(payload: &(dyn std::any::Any + Send)) -> String {\n");
        out.push_str("    if let Some(message) = payload.downcast_ref::<&str>() {\n");
        out.push_str("        (*message).to_string()\n");
        out.push_str("    } else if let Some(message) = payload.downcast_ref::<String>() {\n");
        out.push_str("        message.clone()\n");
        out.push_str("    } else {\n");
        out.push_str("        \"non-string panic payload\".to_string()\n");
        out.push_str("    }\n");
        out.push_str("}\n");
    }

    if emitter.uses_stub {
        out.push_str("\nfn stub<T: Default>() -> T {\n");
        out.push_str("    T::default()\n");
        out.push_str("}\n");
    }

    out
}
