use std::collections::BTreeSet;

use crave_rs::config::GeneratorConfig;
use crave_rs::context::Context;
use crave_rs::distribution::Distribution;
use crave_rs::error::Error;
use crave_rs::expr::Expr;
use crave_rs::generator::Generator;
use test_log::test;

fn seeded(seed: u64) -> GeneratorConfig {
    GeneratorConfig::default().with_seed(seed)
}

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

#[test]
fn test_soft_drop_is_minimal() {
    let ctx = Context::new();
    let a = ctx.var::<u8>();
    let b = ctx.var::<u8>();
    let c = ctx.var::<u8>();
    let mut gen = Generator::with_config(&ctx, seeded(1));
    gen.add(a.ge(100)).unwrap();
    gen.add(b.gt(50).and(b.le(100))).unwrap();
    gen.add((&c % &a).equal(0)).unwrap();
    gen.soft_named("s1", a.equal(&b)).unwrap();
    gen.soft_named("s2", a.equal(&c)).unwrap();
    gen.soft_named("s3", b.not_equal(&c)).unwrap();
    gen.soft_named("s4", c.gt(0).and(c.lt(100))).unwrap();

    for _ in 0..5 {
        assert!(gen.next().unwrap());
        assert!(a.get() >= 100);
        assert!(b.get() > 50 && b.get() <= 100);
        assert_eq!(c.get() % a.get(), 0);
        // The kept softs hold.
        assert_eq!(a.get(), c.get());
        assert_ne!(b.get(), c.get());
    }
    assert_eq!(sorted(gen.inactive_softs()), vec!["s1", "s4"]);
}

#[test]
fn test_contradictions_by_name() {
    let ctx = Context::new();
    let b = ctx.var::<bool>();
    let d = ctx.var::<bool>();
    let x = ctx.var::<u8>();
    let mut gen = Generator::with_config(&ctx, seeded(2));
    gen.add_named("free", x.lt(10)).unwrap();
    gen.add_named("differ", d.not_equal(&b)).unwrap();
    gen.add_named("same", d.equal(&b)).unwrap();
    assert!(!gen.next().unwrap());
    assert!(matches!(gen.try_next(), Err(Error::Unsatisfiable)));

    let groups: Vec<Vec<String>> = gen.analyse_contradiction().into_iter().map(sorted).collect();
    assert_eq!(groups, vec![vec!["differ".to_string(), "same".to_string()]]);
}

#[test]
fn test_triangle_contradiction() {
    let ctx = Context::new();
    let [a, b, c] = [0; 3].map(|_| ctx.var::<bool>());
    let mut gen = Generator::with_config(&ctx, seeded(3));
    gen.add_named("ab", a.not_equal(&b)).unwrap();
    gen.add_named("bc", b.not_equal(&c)).unwrap();
    gen.add_named("ca", c.not_equal(&a)).unwrap();
    assert!(!gen.next().unwrap());

    let groups: Vec<Vec<String>> = gen.analyse_contradiction().into_iter().map(sorted).collect();
    assert_eq!(groups, vec![vec!["ab".to_string(), "bc".to_string(), "ca".to_string()]]);
}

#[test]
fn test_constant_constraints() {
    let ctx = Context::new();
    let mut gen = Generator::with_config(&ctx, seeded(4));
    gen.add_named("yes", Expr::bool(true)).unwrap();
    gen.add_named("no", Expr::bool(false)).unwrap();
    assert!(!gen.next().unwrap());
    assert_eq!(gen.analyse_contradiction(), vec![vec!["no".to_string()]]);

    assert!(gen.disable_constraint("no"));
    assert!(gen.next().unwrap());
    assert!(gen.analyse_contradiction().is_empty());
}

#[test]
fn test_enable_disable_round_trip() {
    let ctx = Context::new();
    let x = ctx.var::<u16>();
    let mut gen = Generator::with_config(&ctx, seeded(5));
    gen.add_named("range", x.lt(1000)).unwrap();
    gen.add_named("even", (&x % 2).equal(0)).unwrap();
    assert!(gen.next().unwrap());
    let before: Vec<String> = gen.partitions()[0].names().iter().map(|n| n.to_string()).collect();

    assert!(gen.disable_constraint("even"));
    assert!(gen.disable_constraint("even"));
    assert!(!gen.disable_constraint("missing"));
    assert!(gen.next().unwrap());
    assert_eq!(gen.partitions()[0].names(), vec!["range"]);

    assert!(gen.enable_constraint("even"));
    assert!(gen.is_constraint_enabled("even"));
    assert!(gen.next().unwrap());
    let after: Vec<String> = gen.partitions()[0].names().iter().map(|n| n.to_string()).collect();
    assert_eq!(before, after);
    assert_eq!(x.get() % 2, 0);
}

#[test]
fn test_threaded_agrees_with_plain() {
    let run = |multithreaded: bool| {
        let ctx = Context::new();
        let vars: Vec<_> = (0..5).map(|_| ctx.var::<u8>()).collect();
        let mut gen = Generator::with_config(&ctx, seeded(6).with_multithreading(multithreaded));
        for pair in vars.windows(2) {
            gen.add(pair[0].lt(&pair[1])).unwrap();
        }
        let extra = ctx.var::<u8>();
        gen.add(extra.gt(7)).unwrap();
        (0..4)
            .map(|_| {
                assert!(gen.next().unwrap());
                vars.iter().map(|v| v.get()).chain([extra.get()]).collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    };
    let plain = run(false);
    for row in &plain {
        assert!(row[..5].windows(2).all(|w| w[0] < w[1]));
        assert!(row[5] > 7);
    }
    assert_eq!(plain, run(true));
}

#[test]
fn test_coverage_exhaustion_and_fallback() {
    let ctx = Context::new();
    let x = ctx.var::<u8>();
    let y = ctx.var::<u8>();
    let mut gen = Generator::with_config(&ctx, seeded(7));
    gen.add(x.lt(20)).unwrap();
    gen.add(y.lt(20)).unwrap();
    gen.cover_named("x_low", x.equal(0)).unwrap();
    gen.cover_named("x_high", x.equal(19)).unwrap();
    gen.cover_named("y_mid", y.equal(10)).unwrap();
    gen.cover_named("never", x.equal(50)).unwrap();

    let mut seen_x = BTreeSet::new();
    let mut seen_y = BTreeSet::new();
    let mut cov_steps = 0;
    while !gen.is_covered() {
        assert!(gen.next_cov().unwrap());
        if !gen.is_covered() {
            cov_steps += 1;
            seen_x.insert(x.get());
            seen_y.insert(y.get());
        }
        assert!(cov_steps <= 3);
    }
    assert!(seen_x.contains(&0) && seen_x.contains(&19));
    assert!(seen_y.contains(&10));
    assert!(x.get() < 20 && y.get() < 20);
}

#[test]
fn test_vectors_under_coverage() {
    let ctx = Context::new();
    let v = ctx.vector::<u8>();
    let y = ctx.var::<u8>();
    let mut gen = Generator::with_config(&ctx, seeded(11));
    gen.add(v.size().equal(4u32)).unwrap();
    gen.add(ctx.foreach(&v, |i| v.at(i).lt(10))).unwrap();
    gen.add(y.lt(50)).unwrap();
    gen.cover_named("y_seven", y.equal(7)).unwrap();
    gen.cover_named("y_thirty", y.equal(30)).unwrap();

    let mut hits = BTreeSet::new();
    while !gen.is_covered() {
        assert!(gen.next_cov().unwrap());
        assert_eq!(v.len(), 4);
        assert_eq!(v.size().get(), 4);
        assert!(v.to_vec().iter().all(|&e| e < 10));
        assert!(y.get() < 50);
        if !gen.is_covered() {
            hits.insert(y.get());
        }
        assert!(hits.len() <= 2);
    }
    assert_eq!(hits, BTreeSet::from([7, 30]));
}

#[test]
fn test_reference_is_assumed() {
    let ctx = Context::new();
    let limit = ctx.reference::<u8>(30);
    let x = ctx.var::<u8>();
    let mut gen = Generator::with_config(&ctx, seeded(8));
    gen.add(x.lt(&limit)).unwrap();
    for _ in 0..5 {
        assert!(gen.next().unwrap());
        assert!(x.get() < 30);
    }
    limit.set(3);
    for _ in 0..5 {
        assert!(gen.next().unwrap());
        assert!(x.get() < 3);
    }
}

#[test]
fn test_distribution_bias() {
    let ctx = Context::new();
    let x = ctx.var::<u8>();
    ctx.dist(&x, Distribution::new().range(10, 12).unwrap().weighted_value(200, 3).unwrap());
    let mut gen = Generator::with_config(&ctx, seeded(9));
    gen.add(x.not_equal(255)).unwrap();
    for _ in 0..20 {
        assert!(gen.next().unwrap());
        assert!((10..=12).contains(&x.get()) || x.get() == 200);
    }
}

#[test]
fn test_distribution_overlap() {
    let dist = Distribution::<u8>::new().range(0, 10).unwrap();
    assert!(matches!(dist.range(5, 20), Err(Error::OverlappingRange)));
}

#[test]
fn test_distribution_weights_are_checked() {
    let dist = Distribution::<u8>::new().weighted_value(1, 0);
    assert!(matches!(dist, Err(Error::InvalidWeight(0))));
    let dist = Distribution::<u16>::new().weighted_range(0, 10, u128::MAX).unwrap();
    assert!(matches!(dist.weighted_range(20, 30, 2), Err(Error::WeightOverflow)));
}

#[test]
fn test_signed_arithmetic() {
    let ctx = Context::new();
    let x = ctx.var::<i8>();
    let y = ctx.var::<i8>();
    let mut gen = Generator::with_config(&ctx, seeded(10));
    gen.add(x.lt(-10)).unwrap();
    gen.add(x.gt(-100)).unwrap();
    gen.add(y.equal(-x.expr() / 2)).unwrap();
    for _ in 0..5 {
        assert!(gen.next().unwrap());
        assert!(x.get() < -10 && x.get() > -100);
        assert_eq!(y.get(), -x.get() / 2);
    }
}
