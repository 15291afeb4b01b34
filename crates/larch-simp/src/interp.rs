//! Reference constant-interpreter
//!
//! Stands in for the byte-code evaluator behind the [`crate::exec`]
//! surface: built-in scalar operations are computed directly, and calls
//! to user functions are resolved through the evaluator's demand-lower
//! callback and interpreted over the function body with a local
//! variable environment.

use std::collections::HashMap;

use thiserror::Error;

use larch_tree::{Arena, BuiltinOp, Kind, Literal, NodeId, SubprogKind, TypeKind};

use crate::exec::{EvalFlags, Exec, ThunkKind};

const MAX_DEPTH: usize = 64;
const MAX_ITERS: usize = 1_000_000;

/// A scalar value produced during evaluation
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Bool(bool),
    /// Reference to an enumeration literal declaration
    Enum(NodeId),
    Phys(i64),
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("expression is not constant")]
    NotConstant,
    #[error("unsupported construct for evaluation")]
    Unsupported,
    #[error("division by zero")]
    DivisionByZero,
    #[error("evaluation recursion limit exceeded")]
    RecursionLimit,
    #[error("iteration limit exceeded")]
    IterationLimit,
}

type Env = HashMap<NodeId, Value>;

enum Flow {
    Normal,
    Return(Value),
}

/// Evaluate an expression to a scalar value
pub fn eval(arena: &Arena, expr: NodeId, exec: &Exec) -> Result<Value, EvalError> {
    let mut env = Env::new();
    eval_expr(arena, expr, &mut env, exec, 0)
}

fn int_of(v: Value) -> Result<i64, EvalError> {
    match v {
        Value::Int(i) | Value::Phys(i) => Ok(i),
        _ => Err(EvalError::Unsupported),
    }
}

fn bool_of(arena: &Arena, v: Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(b),
        Value::Enum(lit) => match arena.pos(lit) {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(EvalError::Unsupported),
        },
        _ => Err(EvalError::Unsupported),
    }
}

fn eval_expr(
    arena: &Arena,
    expr: NodeId,
    env: &mut Env,
    exec: &Exec,
    depth: usize,
) -> Result<Value, EvalError> {
    if depth > MAX_DEPTH {
        return Err(EvalError::RecursionLimit);
    }

    match arena.kind(expr) {
        Kind::Literal => match arena.literal(expr) {
            Literal::Int(i) => Ok(Value::Int(i)),
            Literal::Real(r) => Ok(Value::Real(r)),
            Literal::Physical { ival, .. } => Ok(Value::Phys(ival)),
            _ => Err(EvalError::NotConstant),
        },

        Kind::Ref => {
            let decl = arena.ref_(expr);
            match arena.kind(decl) {
                Kind::EnumLit => Ok(Value::Enum(decl)),
                Kind::ConstDecl | Kind::UnitDecl if arena.has_value(decl) => {
                    eval_expr(arena, arena.value(decl), env, exec, depth + 1)
                }
                Kind::VarDecl | Kind::PortDecl => {
                    env.get(&decl).copied().ok_or(EvalError::NotConstant)
                }
                _ => Err(EvalError::NotConstant),
            }
        }

        Kind::Qualified => eval_expr(arena, arena.value(expr), env, exec, depth + 1),

        Kind::TypeConv => {
            let v = eval_expr(arena, arena.value(expr), env, exec, depth + 1)?;
            let target = arena.type_of(expr).base_recur().kind();
            match (target, v) {
                (TypeKind::Integer, Value::Real(r)) => Ok(Value::Int(r.round() as i64)),
                (TypeKind::Real, Value::Int(i)) => Ok(Value::Real(i as f64)),
                _ => Ok(v),
            }
        }

        Kind::Fcall => {
            let decl = arena.ref_(expr);
            let mut args = Vec::new();
            for p in arena.params(expr) {
                let value = p.value().ok_or(EvalError::Unsupported)?;
                args.push(eval_expr(arena, value, env, exec, depth + 1)?);
            }

            match arena.subprog_kind(decl) {
                SubprogKind::Builtin(op) => apply_builtin(arena, op, &args),
                SubprogKind::User if exec.flags().contains(EvalFlags::FCALL) => {
                    let key = if arena.has_ident2(decl) {
                        arena.ident2(decl)
                    } else {
                        arena.ident(decl)
                    };
                    let thunk = exec.lower(arena, key).ok_or(EvalError::NotConstant)?;
                    let body = match thunk.0 {
                        ThunkKind::Body(body) => body,
                        ThunkKind::Expr(e) => {
                            return eval_expr(arena, e, env, exec, depth + 1)
                        }
                    };
                    call_function(arena, body, &args, exec, depth + 1)
                }
                _ => Err(EvalError::NotConstant),
            }
        }

        _ => Err(EvalError::Unsupported),
    }
}

fn call_function(
    arena: &Arena,
    body: NodeId,
    args: &[Value],
    exec: &Exec,
    depth: usize,
) -> Result<Value, EvalError> {
    if depth > MAX_DEPTH {
        return Err(EvalError::RecursionLimit);
    }
    if arena.kind(body) != Kind::FuncBody {
        return Err(EvalError::Unsupported);
    }

    let mut env = Env::new();
    let ports = arena.ports(body).to_vec();
    if ports.len() != args.len() {
        return Err(EvalError::Unsupported);
    }
    for (&port, &arg) in ports.iter().zip(args.iter()) {
        env.insert(port, arg);
    }

    for &decl in &arena.decls(body).to_vec() {
        if arena.kind(decl) == Kind::VarDecl && arena.has_value(decl) {
            let v = eval_expr(arena, arena.value(decl), &mut env, exec, depth + 1)?;
            env.insert(decl, v);
        }
    }

    match eval_stmts(arena, &arena.stmts(body).to_vec(), &mut env, exec, depth)? {
        Flow::Return(v) => Ok(v),
        Flow::Normal => Err(EvalError::Unsupported),
    }
}

fn eval_stmts(
    arena: &Arena,
    stmts: &[NodeId],
    env: &mut Env,
    exec: &Exec,
    depth: usize,
) -> Result<Flow, EvalError> {
    for &stmt in stmts {
        match arena.kind(stmt) {
            Kind::Null => {}

            Kind::VarAssign => {
                let target = arena.target(stmt);
                if arena.kind(target) != Kind::Ref {
                    return Err(EvalError::Unsupported);
                }
                let decl = arena.ref_(target);
                let v = eval_expr(arena, arena.value(stmt), env, exec, depth + 1)?;
                env.insert(decl, v);
            }

            Kind::If => {
                let cond = eval_expr(arena, arena.value(stmt), env, exec, depth + 1)?;
                let branch = if bool_of(arena, cond)? {
                    arena.stmts(stmt).to_vec()
                } else {
                    arena.else_stmts(stmt).to_vec()
                };
                if let Flow::Return(v) = eval_stmts(arena, &branch, env, exec, depth)? {
                    return Ok(Flow::Return(v));
                }
            }

            Kind::While => {
                let body = arena.stmts(stmt).to_vec();
                let mut iters = 0usize;
                loop {
                    let cond = eval_expr(arena, arena.value(stmt), env, exec, depth + 1)?;
                    if !bool_of(arena, cond)? {
                        break;
                    }
                    if let Flow::Return(v) = eval_stmts(arena, &body, env, exec, depth)? {
                        return Ok(Flow::Return(v));
                    }
                    iters += 1;
                    if iters > MAX_ITERS {
                        return Err(EvalError::IterationLimit);
                    }
                }
            }

            Kind::Return => {
                if arena.has_value(stmt) {
                    let v = eval_expr(arena, arena.value(stmt), env, exec, depth + 1)?;
                    return Ok(Flow::Return(v));
                }
                return Err(EvalError::Unsupported);
            }

            _ => return Err(EvalError::Unsupported),
        }
    }
    Ok(Flow::Normal)
}

fn apply_builtin(arena: &Arena, op: BuiltinOp, args: &[Value]) -> Result<Value, EvalError> {
    use BuiltinOp::*;

    // Real arithmetic is dispatched separately so integer identities
    // stay exact
    if let [Value::Real(a), Value::Real(b)] = args {
        let (a, b) = (*a, *b);
        return match op {
            Add => Ok(Value::Real(a + b)),
            Sub => Ok(Value::Real(a - b)),
            Mul => Ok(Value::Real(a * b)),
            Div => Ok(Value::Real(a / b)),
            Eq => Ok(Value::Bool(a == b)),
            Neq => Ok(Value::Bool(a != b)),
            Lt => Ok(Value::Bool(a < b)),
            Le => Ok(Value::Bool(a <= b)),
            Gt => Ok(Value::Bool(a > b)),
            Ge => Ok(Value::Bool(a >= b)),
            _ => Err(EvalError::Unsupported),
        };
    }

    match op {
        Add | Sub | Mul | Div | Mod | Rem => {
            let [a, b] = args else {
                return Err(EvalError::Unsupported);
            };
            let phys = matches!(a, Value::Phys(_)) || matches!(b, Value::Phys(_));
            let (a, b) = (int_of(*a)?, int_of(*b)?);
            let r = match op {
                Add => a.wrapping_add(b),
                Sub => a.wrapping_sub(b),
                Mul => a.wrapping_mul(b),
                Div => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a / b
                }
                Rem => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a % b
                }
                Mod => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    ((a % b) + b) % b
                }
                _ => unreachable!(),
            };
            Ok(if phys { Value::Phys(r) } else { Value::Int(r) })
        }

        Neg => Ok(Value::Int(-int_of(args[0])?)),
        Abs => Ok(Value::Int(int_of(args[0])?.abs())),

        Eq | Neq | Lt | Le | Gt | Ge => {
            let [a, b] = args else {
                return Err(EvalError::Unsupported);
            };
            let (a, b) = match (a, b) {
                (Value::Enum(x), Value::Enum(y)) => {
                    (arena.pos(*x) as i64, arena.pos(*y) as i64)
                }
                (Value::Bool(x), Value::Bool(y)) => (*x as i64, *y as i64),
                _ => (int_of(*a)?, int_of(*b)?),
            };
            Ok(Value::Bool(match op {
                Eq => a == b,
                Neq => a != b,
                Lt => a < b,
                Le => a <= b,
                Gt => a > b,
                Ge => a >= b,
                _ => unreachable!(),
            }))
        }

        And | Or | Nand | Nor | Xor | Xnor => {
            let [a, b] = args else {
                return Err(EvalError::Unsupported);
            };
            let (a, b) = (bool_of(arena, *a)?, bool_of(arena, *b)?);
            Ok(Value::Bool(match op {
                And => a && b,
                Or => a || b,
                Nand => !(a && b),
                Nor => !(a || b),
                Xor => a ^ b,
                Xnor => !(a ^ b),
                _ => unreachable!(),
            }))
        }

        Not => Ok(Value::Bool(!bool_of(arena, args[0])?)),
    }
}

/// Build the literal node standing for `value`, typed like `proto`
pub fn value_to_node(arena: &mut Arena, proto: NodeId, value: Value) -> Option<NodeId> {
    match value {
        Value::Int(i) => Some(arena.get_int_lit(proto, i)),
        Value::Real(r) => Some(arena.get_real_lit(proto, r)),
        Value::Bool(b) => Some(arena.get_enum_lit(proto, b)),
        Value::Enum(lit) => Some(arena.make_ref(lit)),
        Value::Phys(i) => {
            let lit = arena.alloc(Kind::Literal);
            arena.set_loc(lit, arena.loc(proto));
            arena.set_literal(lit, Literal::Physical { ival: i, dval: 0.0 });
            if arena.has_type(proto) {
                arena.set_type(lit, arena.type_of(proto));
            }
            Some(lit)
        }
    }
}
