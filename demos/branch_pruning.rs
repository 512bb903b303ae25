//! Branch Pruning with Bit-Precise Facts.
//!
//! This example walks a small program through the transfer relation and
//! shows how the BDD-backed fact prunes infeasible branches:
//!
//! ```c
//! int x = 5;
//! int y = x + 3;
//! if (y == 8) { ... }   // always taken
//! else { ... }          // infeasible, zero successors
//! ```
//!
//! It also demonstrates the host queries (`VALUES`, `VARSET`, `VARSETSIZE`)
//! and a DOT dump of the final fact.

use std::collections::HashMap;
use std::rc::Rc;

use bitbdd_rs::config::AnalysisConfig;
use bitbdd_rs::dump::{Query, StateDumper};
use bitbdd_rs::expr::{BinaryOp, CType, Expr, ScopedName};
use bitbdd_rs::ordering::{PartitionId, PartitionInfo, PartitionKind};
use bitbdd_rs::region::RegionManager;
use bitbdd_rs::state::AnalysisState;
use bitbdd_rs::transfer::{CfgEdge, TransferRelation};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let mut config = AnalysisConfig::default();
    config.default_bitwidth = 8;
    config.validate();

    let regions = Rc::new(RegionManager::new(config.storage_bits));
    let relation = TransferRelation::new(Rc::clone(&regions), &config);
    let state = AnalysisState::initial(Rc::clone(&regions));
    let no_shutdown = || false;

    println!("Program:");
    println!("  int x = 5;");
    println!("  int y = x + 3;");
    println!("  if (y == 8) ... else ...");
    println!();

    let x = ScopedName::global("x");
    let y = ScopedName::global("y");
    let ty = CType::new(8, true);
    let partition = Some(PartitionInfo {
        id: PartitionId(1),
        kind: PartitionKind::IntAdd,
        literals: vec![],
        var_count: 2,
    });

    // int x = 5;
    let state = relation
        .successor(
            &state,
            &CfgEdge::Declare {
                var: x.clone(),
                ty,
                partition: partition.clone(),
                init: Some(Expr::literal(5)),
            },
            &no_shutdown,
        )?
        .unwrap();

    // int y = x + 3;
    let state = relation
        .successor(
            &state,
            &CfgEdge::Declare {
                var: y.clone(),
                ty,
                partition: partition.clone(),
                init: Some(Expr::binary(BinaryOp::Add, Expr::var(x), Expr::literal(3))),
            },
            &no_shutdown,
        )?
        .unwrap();

    let condition = Expr::binary(BinaryOp::Eq, Expr::var(y), Expr::literal(8));

    // Then branch: [y == 8]
    let then_edge = CfgEdge::Assume {
        condition: condition.clone(),
        ty,
        partition: partition.clone(),
        polarity: true,
    };
    let then_state = relation.successor(&state, &then_edge, &no_shutdown)?;
    println!("then branch [y == 8]: {}", describe(&then_state));

    // Else branch: [!(y == 8)]
    let else_edge = CfgEdge::Assume {
        condition,
        ty,
        partition,
        polarity: false,
    };
    let else_state = relation.successor(&state, &else_edge, &no_shutdown)?;
    println!("else branch [y != 8]: {}", describe(&else_state));

    assert!(then_state.is_some());
    assert!(else_state.is_none());

    let kinds: HashMap<ScopedName, PartitionKind> = [
        (ScopedName::global("x"), PartitionKind::IntAdd),
        (ScopedName::global("y"), PartitionKind::IntAdd),
    ]
    .into_iter()
    .collect();
    relation.predicates().log_tracked_by_class(&kinds);

    let dumper = StateDumper::new(Rc::clone(&regions), relation.predicates());
    println!();
    println!("VARSET     = {}", dumper.answer(Query::VarSet, &state));
    println!("VARSETSIZE = {}", dumper.answer(Query::VarSetSize, &state));
    println!("VALUES     = {}", dumper.answer(Query::Values, &state));
    println!();
    println!("DOT dump of the fact after `y = x + 3`:");
    println!("{}", dumper.to_dot(&state)?);

    Ok(())
}

fn describe(state: &Option<AnalysisState>) -> &'static str {
    match state {
        Some(_) => "feasible",
        None => "infeasible, pruned",
    }
}
