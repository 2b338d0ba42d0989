//! Dump the register demand stream of built-in sample functions.
//!
//! Development aid for inspecting what the demand pass emits for common node
//! shapes without wiring up a full frontend.

use bumpalo::Bump;
use clap::Parser;
use log::info;

use rvjit::core::CompilationSession;
use rvjit::ir::{
    BinaryOp, CallDesc, CallTarget, IrBuilder, Node, NodeFlags, Oper, Relation, ReturnKind,
    ValueType,
};
use rvjit::riscv64::abi::A0;
use rvjit::riscv64::{DemandPass, FrameInfo, IsaDescription, IsaFeatures};

#[derive(Parser, Debug)]
#[command(name = "demandump", about = "Dump register demand for sample functions")]
struct Args {
    /// Assume the Zbb bit manipulation extension is available.
    #[arg(long)]
    zbb: bool,

    /// Only dump the named sample (see --list).
    #[arg(long)]
    sample: Option<String>,

    /// List available samples and exit.
    #[arg(long)]
    list: bool,
}

type SampleFn = for<'a> fn(&IrBuilder<'a>) -> Vec<&'a Node<'a>>;

const SAMPLES: &[(&str, SampleFn)] = &[
    ("checked-add", sample_checked_add),
    ("rotate", sample_rotate),
    ("compare32", sample_compare32),
    ("call", sample_call),
];

fn sample_checked_add<'a>(b: &IrBuilder<'a>) -> Vec<&'a Node<'a>> {
    let lhs = b.local(ValueType::Int);
    let rhs = b.local(ValueType::Int);
    let add = b.node_with_flags(
        ValueType::Int,
        NodeFlags {
            overflow_check: true,
            ..NodeFlags::default()
        },
        Oper::Binary {
            op: BinaryOp::Add,
            lhs,
            rhs,
        },
    );
    let ret = b.node(ValueType::Void, Oper::Return { value: Some(add) });
    vec![lhs, rhs, add, ret]
}

fn sample_rotate<'a>(b: &IrBuilder<'a>) -> Vec<&'a Node<'a>> {
    let value = b.local(ValueType::Long);
    let amount = b.local(ValueType::Long);
    let rol = b.binary(BinaryOp::Rol, ValueType::Long, value, amount);
    let ret = b.node(ValueType::Void, Oper::Return { value: Some(rol) });
    vec![value, amount, rol, ret]
}

fn sample_compare32<'a>(b: &IrBuilder<'a>) -> Vec<&'a Node<'a>> {
    let lhs = b.local(ValueType::Int);
    let rhs = b.local(ValueType::Int);
    let cmp = b.node(
        ValueType::Int,
        Oper::Compare {
            rel: Relation::Lt,
            lhs,
            rhs,
        },
    );
    let ret = b.node(ValueType::Void, Oper::Return { value: Some(cmp) });
    vec![lhs, rhs, cmp, ret]
}

fn sample_call<'a>(b: &IrBuilder<'a>) -> Vec<&'a Node<'a>> {
    let value = b.local(ValueType::Long);
    let arg = b.node(
        ValueType::Long,
        Oper::PutArgReg {
            src: value,
            reg: A0,
        },
    );
    let call = b.node(
        ValueType::Long,
        Oper::Call(CallDesc {
            target: CallTarget::Direct,
            args: b.nodes(&[arg]),
            ret: ReturnKind::Single,
            fast_tail_call: false,
            helper: None,
        }),
    );
    let ret = b.node(ValueType::Void, Oper::Return { value: Some(call) });
    vec![value, arg, call, ret]
}

fn dump_sample(
    name: &str,
    build: SampleFn,
    isa: &IsaDescription,
) -> Result<(), rvjit::CompileError> {
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    session.set_current_function(name);
    let b = IrBuilder::new(&session);
    let nodes = build(&b);

    let mut pass = DemandPass::new(&session, isa, FrameInfo::default());
    pass.run(&nodes)?;

    let banner = session.current_function().unwrap_or_else(|| name.to_string());
    println!("== {banner} ==");
    for record in pass.stream().records() {
        println!("  {record}");
    }
    info!("{name}: {}", session.stats());
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if args.list {
        for (name, _) in SAMPLES {
            println!("{name}");
        }
        return;
    }

    let isa = IsaDescription::new(IsaFeatures { zbb: args.zbb });

    for (name, build) in SAMPLES {
        if let Some(ref wanted) = args.sample {
            if wanted != name {
                continue;
            }
        }
        if let Err(err) = dump_sample(name, *build, &isa) {
            eprintln!("{name}: {err}");
            std::process::exit(1);
        }
    }
}
