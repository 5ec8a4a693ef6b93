//! Fold a constant add into the quantization that follows it.
//!
//! `fq(x + c, il, ih, ol, oh)` becomes `fq(x, il - c, ih - c, ol, oh)`.

use qfold_ir::Result;
use qfold_ir::prelude::*;

use super::{OrReject, fq_levels, reject, same_info};

pub const NAME: &str = "add_fake_quantize";

pub fn pattern() -> Pat {
    let add = Pat::commutative(BinaryOp::Add, [Pat::var("x"), Pat::cvar("c")])
        .with_predicate(consumers_count(1))
        .named("add");
    Pat::fake_quantize(add, [Pat::var("il"), Pat::var("ih"), Pat::var("ol"), Pat::var("oh")])
}

pub fn rule() -> RewriteRule {
    RewriteRule::new(NAME, pattern(), |m, rw| fuse(m, rw).into())
}

fn fuse(m: &Match<'_>, rw: &mut Rewriter<'_>) -> Option<Value> {
    let graph = rw.graph();
    let levels = fq_levels(graph, m.root())?;
    let x = m.get("x")?;
    if !same_info(graph, x, m.get("add")?) {
        return reject(NAME, "add broadcasts its data operand");
    }

    let [Some(c), Some(il), Some(ih), Some(ol), Some(oh)] = ["c", "il", "ih", "ol", "oh"].map(|n| m.get(n)) else {
        return None;
    };
    stage(rw, levels, x, c, [il, ih, ol, oh]).or_reject(NAME)
}

fn stage(rw: &mut Rewriter<'_>, levels: u32, x: TensorRef, c: TensorRef, [il, ih, ol, oh]: [TensorRef; 4]) -> Result<Value> {
    let il = rw.binary(BinaryOp::Sub, il, c)?;
    let ih = rw.binary(BinaryOp::Sub, ih, c)?;
    rw.add(Op::FakeQuantize { levels }, [x.into(), il, ih, ol.into(), oh.into()])
}
