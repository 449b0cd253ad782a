//! Evaluation engines behind the driver.
//!
//! Both back-ends keep their state (top frame, installed definitions)
//! across top-level forms, and both survive per-form errors: a failed form
//! leaves earlier definitions intact.

use skeinc::bccompiler::ByteCodeCompiler;
use skeinc::error::Result;
use skeinc::interp::Evaluator;
use skeinc::value::Value;
use skeinc::vm::Vm;
use skeinc::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Tree,
    Vm,
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "tree" => Ok(EngineKind::Tree),
            "vm" => Ok(EngineKind::Vm),
            other => Err(format!("unknown engine '{}', expected tree or vm", other)),
        }
    }
}

pub enum Engine {
    Tree(Evaluator),
    Vm {
        compiler: ByteCodeCompiler,
        vm: Vm,
    },
}

impl Engine {
    pub fn new(kind: EngineKind) -> Self {
        match kind {
            EngineKind::Tree => Engine::Tree(Evaluator::new()),
            EngineKind::Vm => Engine::Vm {
                compiler: ByteCodeCompiler::new(),
                vm: Vm::new(),
            },
        }
    }

    /// Evaluate one top-level form; the rendering of its value, or None
    /// for void results (which the driver does not echo).
    pub fn eval(&mut self, expr: &Expr) -> Result<Option<String>> {
        match self {
            Engine::Tree(eval) => {
                let value = eval.eval_toplevel(expr)?;
                Ok(match value {
                    Value::Void => None,
                    other => Some(other.to_string()),
                })
            }
            Engine::Vm { compiler, vm } => {
                let entry = compiler.compile_toplevel(expr)?;
                vm.sync_globals(compiler.globals_len());
                let value = vm.execute(compiler.graph(), entry, compiler.global_names())?;
                Ok(if value.is_void() {
                    None
                } else {
                    Some(skeinc::display_string(value))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skeinc::Parser;

    fn run(kind: EngineKind, src: &str) -> Vec<Option<String>> {
        let forms = Parser::new(src).parse_program().expect("parse failed");
        let mut engine = Engine::new(kind);
        forms
            .iter()
            .map(|f| engine.eval(f).expect("evaluation failed"))
            .collect()
    }

    #[test]
    fn test_both_engines_agree_on_basics() {
        for kind in [EngineKind::Tree, EngineKind::Vm] {
            assert_eq!(run(kind, "(+ 1 2)"), vec![Some("3".to_string())]);
            assert_eq!(run(kind, "(if #f 1 2)"), vec![Some("2".to_string())]);
            assert_eq!(run(kind, "'(1 2 3)"), vec![Some("(1 2 3)".to_string())]);
        }
    }

    #[test]
    fn test_void_results_not_echoed() {
        for kind in [EngineKind::Tree, EngineKind::Vm] {
            let out = run(kind, "(define x 4) x");
            assert_eq!(out, vec![None, Some("4".to_string())]);
        }
    }

    #[test]
    fn test_definitions_survive_errors() {
        for kind in [EngineKind::Tree, EngineKind::Vm] {
            let forms = Parser::new("(define x 3) (car 0) (+ x 1)")
                .parse_program()
                .unwrap();
            let mut engine = Engine::new(kind);
            assert!(engine.eval(&forms[0]).is_ok());
            assert!(engine.eval(&forms[1]).is_err());
            assert_eq!(engine.eval(&forms[2]).unwrap(), Some("4".to_string()));
        }
    }

    #[test]
    fn test_engine_kind_parsing() {
        assert_eq!("tree".parse::<EngineKind>().unwrap(), EngineKind::Tree);
        assert_eq!("vm".parse::<EngineKind>().unwrap(), EngineKind::Vm);
        assert!("jit".parse::<EngineKind>().is_err());
    }
}
