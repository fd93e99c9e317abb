use std::collections::HashMap;

use super::ast::{Expr, Function, Item, Prototype};
use super::ir::IrBuilder;

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable {0}")]
    UnknownVariable(String),
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("invalid binary operator '{0}'")]
    InvalidOperator(char),
    #[error("call to {0} expects {1} arguments, {2} supplied")]
    ArityMismatch(String, usize, usize),
    #[error("redefinition of function {0}")]
    Redefinition(String),
    #[error("redefinition of function {0} with a different parameter count")]
    RedefinitionArity(String),
    #[error("function {0} failed verification")]
    InvalidFunction(String),
}

pub type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct FunctionInfo {
    arity: usize,
    has_body: bool,
}

/// Lowers parsed items through an [`IrBuilder`]. Keeps its own record of
/// every named function's arity and whether a body has been seen, so calls
/// and redefinitions are checked before the backend is touched.
pub struct Codegen<B: IrBuilder> {
    pub module: B,
    functions: HashMap<String, FunctionInfo>,
    named_values: HashMap<String, B::Value>,
}

impl<B: IrBuilder> Codegen<B> {
    pub fn new(module: B) -> Self {
        Self {
            module,
            functions: HashMap::new(),
            named_values: HashMap::new(),
        }
    }

    pub fn lower(&mut self, item: &Item) -> CodegenResult<B::Function> {
        match item {
            Item::Extern(proto) => self.lower_prototype(proto),
            Item::Function(function) => self.lower_function(function),
        }
    }

    fn lower_expr(&mut self, expr: &Expr) -> CodegenResult<B::Value> {
        match expr {
            Expr::Number(value) => Ok(self.module.const_float(*value)),
            Expr::Variable(name) => match self.named_values.get(name) {
                Some(&value) => Ok(value),
                None => Err(CodegenError::UnknownVariable(name.clone())),
            },
            Expr::Binary(op, left, right) => {
                let lhs = self.lower_expr(left)?;
                let rhs = self.lower_expr(right)?;

                match op {
                    '+' => Ok(self.module.build_add(lhs, rhs)),
                    '-' => Ok(self.module.build_sub(lhs, rhs)),
                    '*' => Ok(self.module.build_mul(lhs, rhs)),
                    // `<` yields a boolean, widened back to 0.0 or 1.0
                    '<' => {
                        let cmp = self.module.build_cmp_ult(lhs, rhs);
                        Ok(self.module.build_bool_to_float(cmp))
                    }
                    _ => Err(CodegenError::InvalidOperator(*op)),
                }
            }
            Expr::Call(callee, args) => {
                let arity = self
                    .functions
                    .get(callee)
                    .ok_or_else(|| CodegenError::UnknownFunction(callee.clone()))?
                    .arity;
                if arity != args.len() {
                    return Err(CodegenError::ArityMismatch(
                        callee.clone(),
                        arity,
                        args.len(),
                    ));
                }

                let func = self
                    .module
                    .get_function(callee)
                    .ok_or_else(|| CodegenError::UnknownFunction(callee.clone()))?;

                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_expr(arg)?);
                }

                Ok(self.module.build_call(func, &lowered))
            }
        }
    }

    /// Declare `proto`, enforcing the redefinition policy: a name that
    /// already has a body, or any arity change, is an error; a matching
    /// bodiless re-declaration reuses the existing function. Anonymous
    /// prototypes skip the table entirely.
    fn lower_prototype(&mut self, proto: &Prototype) -> CodegenResult<B::Function> {
        if !proto.is_anonymous() {
            if let Some(info) = self.functions.get(&proto.name) {
                if info.has_body {
                    return Err(CodegenError::Redefinition(proto.name.clone()));
                }
                if info.arity != proto.params.len() {
                    return Err(CodegenError::RedefinitionArity(proto.name.clone()));
                }
            }
        }

        let func = self.module.declare_function(&proto.name, &proto.params);
        if !proto.is_anonymous() {
            self.functions
                .entry(proto.name.clone())
                .or_insert(FunctionInfo {
                    arity: proto.params.len(),
                    has_body: false,
                });
        }

        // bind parameters for the body about to follow, overwriting
        // anything stale
        for (param, value) in proto.params.iter().zip(self.module.params(func)) {
            self.named_values.insert(param.clone(), value);
        }

        Ok(func)
    }

    fn lower_function(&mut self, function: &Function) -> CodegenResult<B::Function> {
        let Function { proto, body } = function;

        // a body only ever sees its own parameters
        self.named_values.clear();
        let func = self.lower_prototype(proto)?;

        self.module.begin_function_body(func);
        match self.lower_expr(body) {
            Ok(result) => {
                self.module.end_function_body(func, result);
                if !self.module.verify_function(func) {
                    self.rollback(func, proto);
                    return Err(CodegenError::InvalidFunction(proto.name.clone()));
                }
                if !proto.is_anonymous() {
                    if let Some(info) = self.functions.get_mut(&proto.name) {
                        info.has_body = true;
                    }
                }
                Ok(func)
            }
            Err(err) => {
                self.rollback(func, proto);
                Err(err)
            }
        }
    }

    /// Drop a failed function from both the backend and the table, so a
    /// later definition of the same name starts clean.
    fn rollback(&mut self, func: B::Function, proto: &Prototype) {
        self.module.discard_function(func);
        if !proto.is_anonymous() {
            self.functions.remove(&proto.name);
        }
    }
}
