use std::collections::HashMap;
use std::fmt;

/// Everything the lowering stage needs from a code-generation backend:
/// function declaration and lookup, instruction building, and the body
/// lifecycle. All values are doubles, so the interface carries no types.
///
/// Instructions may only be built between [`begin_function_body`] and
/// [`end_function_body`], and re-declaring a name with a different arity
/// is a caller error - the lowering stage checks both before calling in.
///
/// [`begin_function_body`]: IrBuilder::begin_function_body
/// [`end_function_body`]: IrBuilder::end_function_body
pub trait IrBuilder {
    type Value: Copy + PartialEq + fmt::Debug;
    type Function: Copy + PartialEq + fmt::Debug;

    /// Declare a function, or return the existing one (with its parameters
    /// renamed) when the non-empty name is already taken. Empty names are
    /// anonymous: every declaration is fresh and none is ever looked up.
    fn declare_function(&mut self, name: &str, params: &[String]) -> Self::Function;
    fn get_function(&self, name: &str) -> Option<Self::Function>;
    fn params(&self, function: Self::Function) -> Vec<Self::Value>;

    fn const_float(&mut self, value: f64) -> Self::Value;
    fn build_add(&mut self, lhs: Self::Value, rhs: Self::Value) -> Self::Value;
    fn build_sub(&mut self, lhs: Self::Value, rhs: Self::Value) -> Self::Value;
    fn build_mul(&mut self, lhs: Self::Value, rhs: Self::Value) -> Self::Value;
    /// Unordered less-than, producing a boolean.
    fn build_cmp_ult(&mut self, lhs: Self::Value, rhs: Self::Value) -> Self::Value;
    /// Widen a boolean back to a double, 0.0 or 1.0.
    fn build_bool_to_float(&mut self, value: Self::Value) -> Self::Value;
    fn build_call(&mut self, function: Self::Function, args: &[Self::Value]) -> Self::Value;

    fn begin_function_body(&mut self, function: Self::Function);
    fn end_function_body(&mut self, function: Self::Function, result: Self::Value);
    /// Remove a half-built function; the rollback path after a failed body.
    fn discard_function(&mut self, function: Self::Function);
    fn verify_function(&self, function: Self::Function) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncId(usize);

/// Index into the owning function's value list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueId(usize);

#[derive(Debug, PartialEq, Clone)]
enum Inst {
    Param(String),
    Const(f64),
    Add(ValueId, ValueId),
    Sub(ValueId, ValueId),
    Mul(ValueId, ValueId),
    CmpUlt(ValueId, ValueId),
    BoolToFloat(ValueId),
    Call(FuncId, Vec<ValueId>),
}

/// The leading `arity` entries of `values` are always the parameters.
#[derive(Debug, PartialEq, Clone)]
struct FuncData {
    name: String,
    arity: usize,
    values: Vec<Inst>,
    has_body: bool,
    ret: Option<ValueId>,
}

#[derive(Debug, PartialEq, Clone)]
struct Slot {
    data: FuncData,
    discarded: bool,
}

/// In-memory reference backend. Functions live in declaration order;
/// discarded ones stay as tombstones so handles stay stable, but they
/// drop out of lookup and rendering.
#[derive(Debug, PartialEq, Clone)]
pub struct Module {
    name: String,
    functions: Vec<Slot>,
    by_name: HashMap<String, FuncId>,
    insert_point: Option<FuncId>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            functions: Vec::new(),
            by_name: HashMap::new(),
            insert_point: None,
        }
    }

    fn active_mut(&mut self) -> &mut FuncData {
        let id = self.insert_point.expect("no active function body");
        &mut self.functions[id.0].data
    }

    fn push(&mut self, inst: Inst) -> ValueId {
        let data = self.active_mut();
        data.values.push(inst);
        ValueId(data.values.len() - 1)
    }

    /// Render the whole module, discarded functions excluded.
    pub fn print_to_string(&self) -> String {
        let mut out = format!("; module '{}'\n", self.name);
        for id in 0..self.functions.len() {
            if self.functions[id].discarded {
                continue;
            }
            out.push('\n');
            self.render_function(FuncId(id), &mut out);
        }
        out
    }

    /// Render a single function as a `declare` line or a full `define` body.
    pub fn print_function(&self, function: FuncId) -> String {
        let mut out = String::new();
        self.render_function(function, &mut out);
        out
    }

    fn func_name(&self, function: FuncId) -> String {
        let data = &self.functions[function.0].data;
        if data.name.is_empty() {
            // anonymous functions render under their slot number
            function.0.to_string()
        } else {
            data.name.clone()
        }
    }

    fn operand(data: &FuncData, value: ValueId) -> String {
        match &data.values[value.0] {
            Inst::Param(name) => format!("%{}", name),
            Inst::Const(v) => format!("{:?}", v),
            _ => format!("%{}", value.0),
        }
    }

    fn render_function(&self, function: FuncId, out: &mut String) {
        let slot = &self.functions[function.0];
        if slot.discarded {
            return;
        }
        let data = &slot.data;

        let params = data.values[..data.arity]
            .iter()
            .map(|inst| match inst {
                Inst::Param(name) => format!("double %{}", name),
                _ => unreachable!(),
            })
            .collect::<Vec<_>>()
            .join(", ");

        if !data.has_body {
            out.push_str(&format!(
                "declare double @{}({})\n",
                self.func_name(function),
                params
            ));
            return;
        }

        out.push_str(&format!(
            "define double @{}({}) {{\n",
            self.func_name(function),
            params
        ));
        out.push_str("entry:\n");
        for (i, inst) in data.values.iter().enumerate() {
            // parameters and constants render inline at their uses
            let line = match inst {
                Inst::Param(_) | Inst::Const(_) => continue,
                Inst::Add(a, b) => format!(
                    "%{} = fadd double {}, {}",
                    i,
                    Self::operand(data, *a),
                    Self::operand(data, *b)
                ),
                Inst::Sub(a, b) => format!(
                    "%{} = fsub double {}, {}",
                    i,
                    Self::operand(data, *a),
                    Self::operand(data, *b)
                ),
                Inst::Mul(a, b) => format!(
                    "%{} = fmul double {}, {}",
                    i,
                    Self::operand(data, *a),
                    Self::operand(data, *b)
                ),
                Inst::CmpUlt(a, b) => format!(
                    "%{} = fcmp ult double {}, {}",
                    i,
                    Self::operand(data, *a),
                    Self::operand(data, *b)
                ),
                Inst::BoolToFloat(a) => {
                    format!("%{} = uitofp i1 {} to double", i, Self::operand(data, *a))
                }
                Inst::Call(callee, args) => {
                    let args = args
                        .iter()
                        .map(|a| format!("double {}", Self::operand(data, *a)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("%{} = call double @{}({})", i, self.func_name(*callee), args)
                }
            };
            out.push_str("  ");
            out.push_str(&line);
            out.push('\n');
        }
        if let Some(ret) = data.ret {
            out.push_str(&format!("  ret double {}\n", Self::operand(data, ret)));
        }
        out.push_str("}\n");
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.print_to_string())
    }
}

impl IrBuilder for Module {
    type Value = ValueId;
    type Function = FuncId;

    fn declare_function(&mut self, name: &str, params: &[String]) -> FuncId {
        if !name.is_empty() {
            if let Some(&id) = self.by_name.get(name) {
                let data = &mut self.functions[id.0].data;
                for (value, param) in data.values.iter_mut().zip(params) {
                    *value = Inst::Param(param.clone());
                }
                return id;
            }
        }

        let id = FuncId(self.functions.len());
        self.functions.push(Slot {
            data: FuncData {
                name: name.to_string(),
                arity: params.len(),
                values: params.iter().map(|p| Inst::Param(p.clone())).collect(),
                has_body: false,
                ret: None,
            },
            discarded: false,
        });
        if !name.is_empty() {
            self.by_name.insert(name.to_string(), id);
        }
        id
    }

    fn get_function(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    fn params(&self, function: FuncId) -> Vec<ValueId> {
        (0..self.functions[function.0].data.arity)
            .map(ValueId)
            .collect()
    }

    fn const_float(&mut self, value: f64) -> ValueId {
        self.push(Inst::Const(value))
    }

    fn build_add(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Inst::Add(lhs, rhs))
    }

    fn build_sub(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Inst::Sub(lhs, rhs))
    }

    fn build_mul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Inst::Mul(lhs, rhs))
    }

    fn build_cmp_ult(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Inst::CmpUlt(lhs, rhs))
    }

    fn build_bool_to_float(&mut self, value: ValueId) -> ValueId {
        self.push(Inst::BoolToFloat(value))
    }

    fn build_call(&mut self, function: FuncId, args: &[ValueId]) -> ValueId {
        self.push(Inst::Call(function, args.to_vec()))
    }

    fn begin_function_body(&mut self, function: FuncId) {
        self.insert_point = Some(function);
    }

    fn end_function_body(&mut self, function: FuncId, result: ValueId) {
        {
            let data = &mut self.functions[function.0].data;
            data.has_body = true;
            data.ret = Some(result);
        }
        if self.insert_point == Some(function) {
            self.insert_point = None;
        }
    }

    fn discard_function(&mut self, function: FuncId) {
        if self.insert_point == Some(function) {
            self.insert_point = None;
        }
        self.functions[function.0].discarded = true;
        let name = self.functions[function.0].data.name.clone();
        if self.by_name.get(&name) == Some(&function) {
            self.by_name.remove(&name);
        }
    }

    fn verify_function(&self, function: FuncId) -> bool {
        let slot = &self.functions[function.0];
        if slot.discarded {
            return false;
        }
        let data = &slot.data;
        if !data.has_body {
            return false;
        }
        let ret = match data.ret {
            Some(ret) => ret,
            None => return false,
        };

        // operands must refer to earlier values, calls to live matching callees
        for (i, inst) in data.values.iter().enumerate() {
            let ok = match inst {
                Inst::Param(_) => i < data.arity,
                Inst::Const(_) => true,
                Inst::Add(a, b) | Inst::Sub(a, b) | Inst::Mul(a, b) | Inst::CmpUlt(a, b) => {
                    a.0 < i && b.0 < i
                }
                Inst::BoolToFloat(a) => a.0 < i,
                Inst::Call(callee, args) => {
                    let callee_ok = self
                        .functions
                        .get(callee.0)
                        .map_or(false, |s| !s.discarded && s.data.arity == args.len());
                    callee_ok && args.iter().all(|a| a.0 < i)
                }
            };
            if !ok {
                return false;
            }
        }

        ret.0 < data.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn declare_then_get() {
        let mut module = Module::new("test");
        let f = module.declare_function("f", &["x".to_string()]);
        assert_eq!(module.get_function("f"), Some(f));
        assert_eq!(module.get_function("g"), None);
    }

    #[test]
    fn redeclaration_returns_the_original_with_renamed_params() {
        let mut module = Module::new("test");
        let first = module.declare_function("f", &["a".to_string()]);
        let second = module.declare_function("f", &["b".to_string()]);
        assert_eq!(first, second);
        assert_eq!(
            module.print_function(first),
            "declare double @f(double %b)\n"
        );
    }

    #[test]
    fn anonymous_functions_are_never_shared() {
        let mut module = Module::new("test");
        let first = module.declare_function("", &[]);
        let second = module.declare_function("", &[]);
        assert_ne!(first, second);
        assert_eq!(module.get_function(""), None);
    }

    #[test]
    fn definitions_render_instructions_in_order() {
        let mut module = Module::new("test");
        let f = module.declare_function("muladd", &["a".to_string(), "b".to_string()]);
        let params = module.params(f);
        module.begin_function_body(f);
        let product = module.build_mul(params[0], params[1]);
        let one = module.const_float(1.0);
        let sum = module.build_add(product, one);
        module.end_function_body(f, sum);
        assert!(module.verify_function(f));

        let expected = "define double @muladd(double %a, double %b) {
entry:
  %2 = fmul double %a, %b
  %4 = fadd double %2, 1.0
  ret double %4
}
";
        assert_eq!(module.print_function(f), expected);
    }

    #[test]
    fn comparison_widens_back_to_a_double() {
        let mut module = Module::new("test");
        let f = module.declare_function("less", &["x".to_string(), "y".to_string()]);
        let params = module.params(f);
        module.begin_function_body(f);
        let cmp = module.build_cmp_ult(params[0], params[1]);
        let wide = module.build_bool_to_float(cmp);
        module.end_function_body(f, wide);

        let expected = "define double @less(double %x, double %y) {
entry:
  %2 = fcmp ult double %x, %y
  %3 = uitofp i1 %2 to double
  ret double %3
}
";
        assert_eq!(module.print_function(f), expected);
    }

    #[test]
    fn calls_render_their_callee_and_arguments() {
        let mut module = Module::new("test");
        let sin = module.declare_function("sin", &["t".to_string()]);
        let wrap = module.declare_function("wrap", &["x".to_string()]);
        let params = module.params(wrap);
        module.begin_function_body(wrap);
        let call = module.build_call(sin, &[params[0]]);
        module.end_function_body(wrap, call);
        assert!(module.verify_function(wrap));

        let expected = "define double @wrap(double %x) {
entry:
  %1 = call double @sin(double %x)
  ret double %1
}
";
        assert_eq!(module.print_function(wrap), expected);
    }

    #[test]
    fn discarded_functions_disappear() {
        let mut module = Module::new("test");
        let f = module.declare_function("bad", &[]);
        module.begin_function_body(f);
        module.const_float(1.0);
        module.discard_function(f);

        assert_eq!(module.get_function("bad"), None);
        assert!(!module.verify_function(f));
        assert_eq!(module.print_to_string(), "; module 'test'\n");
    }

    #[test]
    fn anonymous_functions_render_under_their_slot_number() {
        let mut module = Module::new("test");
        module.declare_function("first", &[]);
        let anon = module.declare_function("", &[]);
        module.begin_function_body(anon);
        let v = module.const_float(4.0);
        module.end_function_body(anon, v);

        let expected = "define double @1() {
entry:
  ret double 4.0
}
";
        assert_eq!(module.print_function(anon), expected);
    }

    #[test]
    fn verify_rejects_a_missing_return() {
        let mut module = Module::new("test");
        let f = module.declare_function("open", &[]);
        module.begin_function_body(f);
        module.const_float(1.0);
        assert!(!module.verify_function(f));
    }

    #[test]
    fn module_dump_lists_functions_in_declaration_order() {
        let mut module = Module::new("flint");
        module.declare_function("sin", &["t".to_string()]);
        let f = module.declare_function("one", &[]);
        module.begin_function_body(f);
        let v = module.const_float(1.0);
        module.end_function_body(f, v);

        let expected = "; module 'flint'

declare double @sin(double %t)

define double @one() {
entry:
  ret double 1.0
}
";
        assert_eq!(module.print_to_string(), expected);
    }
}
