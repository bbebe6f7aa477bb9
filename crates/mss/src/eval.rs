//! Expression evaluation: variable resolution, arithmetic, and color
//! functions. Produces the immutable evaluated block tree.

use crate::color::{self, Color};
use crate::parser::{Expr, RawBlock, Sheet};
use crate::properties::{Key, Pos, Properties};
use crate::value::{self, Stop, Value};
use crate::{Block, EvalError, Mss};
use std::collections::HashMap;

/// A variable slot: lazily evaluated with an in-progress marker for
/// cycle detection.
enum Slot {
    Expr(Expr),
    Busy,
    Val(Value),
}

type Frame = HashMap<String, Slot>;

struct Evaluator {
    frames: Vec<Frame>,
    map_props: Properties,
}

/// Evaluate the parsed sheets into one block tree. Root-level variables
/// from every sheet share a single scope so later stylesheets can refer
/// to variables of earlier ones.
pub(crate) fn evaluate_sheets(sheets: &[Sheet]) -> Result<Mss, EvalError> {
    let mut evaluator = Evaluator {
        frames: Vec::new(),
        map_props: Properties::new(),
    };

    let mut globals = Frame::new();
    for sheet in sheets {
        for var in &sheet.root.vars {
            globals.insert(var.name.clone(), Slot::Expr(var.expr.clone()));
        }
    }
    evaluator.frames.push(globals);

    let mut root = Block::default();
    for sheet in sheets {
        for raw in &sheet.root.children {
            if let Some(block) = evaluator.eval_block(raw)? {
                root.blocks.push(block);
            }
        }
    }

    Ok(Mss { root, map_props: evaluator.map_props })
}

impl Evaluator {
    /// Evaluate one block. `Map { }` blocks contribute to the map-scope
    /// properties and produce no tree node.
    fn eval_block(&mut self, raw: &RawBlock) -> Result<Option<Block>, EvalError> {
        let mut frame = Frame::new();
        for var in &raw.vars {
            frame.insert(var.name.clone(), Slot::Expr(var.expr.clone()));
        }
        self.frames.push(frame);

        let result = self.eval_block_inner(raw);
        self.frames.pop();
        result
    }

    fn eval_block_inner(&mut self, raw: &RawBlock) -> Result<Option<Block>, EvalError> {
        let mut properties = Properties::new();
        for decl in &raw.decls {
            let value = self.eval_expr(&decl.expr)?;
            properties.set_pos(Key::instanced(&decl.name, &decl.instance), value, decl.pos);
        }

        if raw.is_map {
            self.map_props.update_missing(&properties);
            return Ok(None);
        }

        let mut block = Block {
            selectors: raw.selectors.clone(),
            properties,
            blocks: Vec::new(),
        };
        for child in &raw.children {
            if let Some(node) = self.eval_block(child)? {
                block.blocks.push(node);
            }
        }
        Ok(Some(block))
    }

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Var(name, pos) => self.lookup(name, *pos),
            Expr::Neg(inner, pos) => match self.eval_expr(inner)? {
                Value::Num(v) => Ok(Value::Num(-v)),
                Value::Percent(v) => Ok(Value::Percent(-v)),
                Value::Dimension(v, unit) => Ok(Value::Dimension(-v, unit)),
                other => Err(EvalError::TypeMismatch {
                    line: pos.line,
                    column: pos.column,
                    message: format!("cannot negate {}", other.type_name()),
                }),
            },
            Expr::BinOp(op, left, right, pos) => {
                let lv = self.eval_expr(left)?;
                let rv = self.eval_expr(right)?;
                value::binop(*op, &lv, &rv).map_err(|message| EvalError::TypeMismatch {
                    line: pos.line,
                    column: pos.column,
                    message,
                })
            }
            Expr::Call(name, args, pos) => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expr(arg)?);
                }
                apply_function(name, &values, *pos)
            }
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item)?);
                }
                Ok(Value::List(values))
            }
        }
    }

    /// Resolve a variable reference, innermost scope first.
    fn lookup(&mut self, name: &str, pos: Pos) -> Result<Value, EvalError> {
        for fi in (0..self.frames.len()).rev() {
            let Some(slot) = self.frames[fi].get(name) else {
                continue;
            };
            match slot {
                Slot::Val(value) => return Ok(value.clone()),
                Slot::Busy => {
                    return Err(EvalError::Cycle {
                        name: name.to_string(),
                        line: pos.line,
                        column: pos.column,
                    })
                }
                Slot::Expr(_) => {
                    let Some(Slot::Expr(expr)) =
                        self.frames[fi].insert(name.to_string(), Slot::Busy)
                    else {
                        unreachable!("slot changed during lookup");
                    };
                    // the definition is evaluated in its own lexical
                    // scope, not the scope of the reference
                    let inner = self.frames.split_off(fi + 1);
                    let result = self.eval_expr(&expr);
                    self.frames.extend(inner);
                    let value = result?;
                    self.frames[fi].insert(name.to_string(), Slot::Val(value.clone()));
                    return Ok(value);
                }
            }
        }
        Err(EvalError::UndefinedVar {
            name: name.to_string(),
            line: pos.line,
            column: pos.column,
        })
    }
}

// Functions -------------------------------------------------------------------

fn arity(name: &str, expected: usize, args: &[Value], pos: Pos) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::Arity {
            function: name.to_string(),
            expected,
            got: args.len(),
            line: pos.line,
            column: pos.column,
        });
    }
    Ok(())
}

fn mismatch(name: &str, arg: &Value, wanted: &str, pos: Pos) -> EvalError {
    EvalError::TypeMismatch {
        line: pos.line,
        column: pos.column,
        message: format!("{name}() expects {wanted}, got {}", arg.type_name()),
    }
}

fn num_arg(name: &str, arg: &Value, pos: Pos) -> Result<f64, EvalError> {
    arg.as_num().ok_or_else(|| mismatch(name, arg, "a number", pos))
}

/// A fraction in 0..=1, written either as a number or a percentage.
fn amount_arg(name: &str, arg: &Value, pos: Pos) -> Result<f64, EvalError> {
    match arg {
        Value::Num(v) => Ok(*v),
        Value::Percent(v) => Ok(v / 100.0),
        other => Err(mismatch(name, other, "a number or percentage", pos)),
    }
}

fn color_arg(name: &str, arg: &Value, pos: Pos) -> Result<Color, EvalError> {
    match arg {
        Value::Color(c) => Ok(*c),
        other => Err(mismatch(name, other, "a color", pos)),
    }
}

/// An sRGB channel: 0..=255 as a number, or a percentage.
fn channel_arg(name: &str, arg: &Value, pos: Pos) -> Result<f64, EvalError> {
    match arg {
        Value::Num(v) => Ok((v / 255.0).clamp(0.0, 1.0)),
        Value::Percent(v) => Ok((v / 100.0).clamp(0.0, 1.0)),
        other => Err(mismatch(name, other, "a channel value", pos)),
    }
}

fn apply_function(name: &str, args: &[Value], pos: Pos) -> Result<Value, EvalError> {
    let color2 = |expected: usize| -> Result<(Color, f64), EvalError> {
        arity(name, expected, args, pos)?;
        Ok((
            color_arg(name, &args[0], pos)?,
            amount_arg(name, &args[1], pos)?,
        ))
    };

    match name {
        "rgb" | "rgba" => {
            let expected = if name == "rgb" { 3 } else { 4 };
            arity(name, expected, args, pos)?;
            let r = channel_arg(name, &args[0], pos)?;
            let g = channel_arg(name, &args[1], pos)?;
            let b = channel_arg(name, &args[2], pos)?;
            let a = if expected == 4 { amount_arg(name, &args[3], pos)? } else { 1.0 };
            Ok(Value::Color(Color::from_rgba(r, g, b, a, false)))
        }
        "hsl" | "hsla" | "husl" | "husla" => {
            let expected = if name.ends_with('a') { 4 } else { 3 };
            arity(name, expected, args, pos)?;
            let h = num_arg(name, &args[0], pos)?;
            let s = amount_arg(name, &args[1], pos)?;
            let l = amount_arg(name, &args[2], pos)?;
            let a = if expected == 4 { amount_arg(name, &args[3], pos)? } else { 1.0 };
            if name.starts_with("husl") {
                Ok(Value::Color(Color::from_husla(h, s, l, a)))
            } else {
                Ok(Value::Color(Color::from_hsla(h, s, l, a)))
            }
        }
        "lighten" => color2(2).map(|(c, v)| Value::Color(color::lighten(c, v))),
        "lightenp" => color2(2).map(|(c, v)| Value::Color(color::lighten_p(c, v))),
        "darken" => color2(2).map(|(c, v)| Value::Color(color::darken(c, v))),
        "darkenp" => color2(2).map(|(c, v)| Value::Color(color::darken_p(c, v))),
        "saturate" => color2(2).map(|(c, v)| Value::Color(color::saturate(c, v))),
        "saturatep" => color2(2).map(|(c, v)| Value::Color(color::saturate_p(c, v))),
        "desaturate" => color2(2).map(|(c, v)| Value::Color(color::desaturate(c, v))),
        "desaturatep" => color2(2).map(|(c, v)| Value::Color(color::desaturate_p(c, v))),
        "fadein" => color2(2).map(|(c, v)| Value::Color(color::fade_in(c, v))),
        "fadeout" => color2(2).map(|(c, v)| Value::Color(color::fade_out(c, v))),
        "multiply" => color2(2).map(|(c, v)| Value::Color(color::multiply(c, v))),
        "spin" | "spinp" => {
            arity(name, 2, args, pos)?;
            let c = color_arg(name, &args[0], pos)?;
            let deg = num_arg(name, &args[1], pos)?;
            if name == "spin" {
                Ok(Value::Color(color::spin(c, deg)))
            } else {
                Ok(Value::Color(color::spin_p(c, deg)))
            }
        }
        "greyscale" | "grayscale" => {
            arity(name, 1, args, pos)?;
            Ok(Value::Color(color::greyscale(color_arg(name, &args[0], pos)?)))
        }
        "greyscalep" | "grayscalep" => {
            arity(name, 1, args, pos)?;
            Ok(Value::Color(color::greyscale_p(color_arg(name, &args[0], pos)?)))
        }
        "mix" => {
            arity(name, 3, args, pos)?;
            let c1 = color_arg(name, &args[0], pos)?;
            let c2 = color_arg(name, &args[1], pos)?;
            let weight = amount_arg(name, &args[2], pos)?;
            Ok(Value::Color(color::mix(c1, c2, weight)))
        }
        "set-hue" => {
            arity(name, 2, args, pos)?;
            let c = color_arg(name, &args[0], pos)?;
            let hue_src = color_arg(name, &args[1], pos)?;
            Ok(Value::Color(color::set_hue(c, hue_src)))
        }
        "hue" => {
            arity(name, 1, args, pos)?;
            Ok(Value::Num(color::hue(color_arg(name, &args[0], pos)?)))
        }
        "huep" => {
            arity(name, 1, args, pos)?;
            Ok(Value::Num(color::hue_p(color_arg(name, &args[0], pos)?)))
        }
        "saturation" => {
            arity(name, 1, args, pos)?;
            Ok(Value::Num(color::saturation(color_arg(name, &args[0], pos)?)))
        }
        "saturationp" => {
            arity(name, 1, args, pos)?;
            Ok(Value::Num(color::saturation_p(color_arg(name, &args[0], pos)?)))
        }
        "lightness" => {
            arity(name, 1, args, pos)?;
            Ok(Value::Num(color::lightness(color_arg(name, &args[0], pos)?)))
        }
        "lightnessp" => {
            arity(name, 1, args, pos)?;
            Ok(Value::Num(color::lightness_p(color_arg(name, &args[0], pos)?)))
        }
        "alpha" => {
            arity(name, 1, args, pos)?;
            Ok(Value::Num(color::alpha(color_arg(name, &args[0], pos)?)))
        }
        "stop" => {
            arity(name, 2, args, pos)?;
            let value = num_arg(name, &args[0], pos)?;
            let color = color_arg(name, &args[1], pos)?;
            Ok(Value::Stop(Stop { value, color }))
        }
        _ => Err(EvalError::UnknownFunction {
            name: name.to_string(),
            line: pos.line,
            column: pos.column,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::Error;

    fn eval(src: &str) -> Result<Mss, Error> {
        let sheet = Parser::new(src, 0).parse_sheet()?;
        evaluate_sheets(&[sheet]).map_err(Error::Eval)
    }

    fn single_block_props(mss: &Mss) -> &Properties {
        &mss.root.blocks[0].properties
    }

    #[test]
    fn arithmetic_and_vars() {
        let mss = eval("@base: 2;\n#r { line-width: @base * 2 + 1; }").unwrap();
        assert_eq!(single_block_props(&mss).get_float("line-width"), Some(5.0));
    }

    #[test]
    fn inner_scope_wins() {
        let mss = eval("@w: 1;\n#r { @w: 3; line-width: @w; }").unwrap();
        assert_eq!(single_block_props(&mss).get_float("line-width"), Some(3.0));
    }

    #[test]
    fn outer_scope_reachable() {
        let mss = eval("@w: 1;\n#r { line-width: @w; }").unwrap();
        assert_eq!(single_block_props(&mss).get_float("line-width"), Some(1.0));
    }

    #[test]
    fn variable_indirection() {
        let mss = eval("@a: 2;\n@b: @a + 1;\n#r { line-width: @b; }").unwrap();
        assert_eq!(single_block_props(&mss).get_float("line-width"), Some(3.0));
    }

    #[test]
    fn definitions_use_their_own_scope() {
        // a block-local @b must not leak into the root definition of @a
        let err = eval("@a: @b;\n#r { @b: 2; line-width: @a; }").unwrap_err();
        assert!(matches!(err, Error::Eval(EvalError::UndefinedVar { .. })), "{err:?}");
    }

    #[test]
    fn cycle_is_detected() {
        let err = eval("@a: @b;\n@b: @a;\n#r { line-width: @a; }").unwrap_err();
        assert!(matches!(err, Error::Eval(EvalError::Cycle { .. })), "{err:?}");
    }

    #[test]
    fn undefined_var() {
        let err = eval("#r { line-width: @nope; }").unwrap_err();
        assert!(matches!(err, Error::Eval(EvalError::UndefinedVar { .. })));
    }

    #[test]
    fn color_functions() {
        let mss = eval("#r { line-color: lighten(#800000, 10%); }").unwrap();
        let c = single_block_props(&mss).get_color("line-color").unwrap();
        assert!(c.l > 0.25 && c.l < 0.36);

        let mss = eval("#r { line-color: rgba(255, 0, 0, 0.5); }").unwrap();
        let c = single_block_props(&mss).get_color("line-color").unwrap();
        assert_eq!(c.rgba8().0, 255);
        assert!((c.a - 0.5).abs() < 1e-9);
    }

    #[test]
    fn type_mismatch_in_function() {
        let err = eval("#r { line-color: lighten(1, 10%); }").unwrap_err();
        assert!(matches!(err, Error::Eval(EvalError::TypeMismatch { .. })));
    }

    #[test]
    fn wrong_arity() {
        let err = eval("#r { line-color: mix(#fff, #000); }").unwrap_err();
        assert!(matches!(
            err,
            Error::Eval(EvalError::Arity { expected: 3, got: 2, .. })
        ));
    }

    #[test]
    fn unknown_function() {
        let err = eval("#r { line-color: frobnicate(#fff); }").unwrap_err();
        assert!(matches!(err, Error::Eval(EvalError::UnknownFunction { .. })));
    }

    #[test]
    fn lists_and_stops() {
        let mss = eval("#r { line-dasharray: 4, 2; }").unwrap();
        assert_eq!(
            single_block_props(&mss).get_float_list("line-dasharray"),
            Some(vec![4.0, 2.0])
        );

        let mss = eval("#r { raster-colorizer-stops: stop(0, #000) stop(100, #fff); }").unwrap();
        let stops = single_block_props(&mss).get_stop_list("raster-colorizer-stops").unwrap();
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[1].value, 100.0);
    }

    #[test]
    fn map_block_properties() {
        let mss = eval("Map { background-color: #abcdef; }\n#r { line-width: 1; }").unwrap();
        assert!(mss.map_properties().get_color("background-color").is_some());
        assert_eq!(mss.root.blocks.len(), 1);
    }

    #[test]
    fn type_mismatch_in_arithmetic() {
        let err = eval("#r { line-width: 'a' * 2; }").unwrap_err();
        assert!(matches!(err, Error::Eval(EvalError::TypeMismatch { .. })));
    }
}
