//! Macro collapsing
//!
//! Contracts originated from source keep Michelson macros in their expanded
//! form (`COMPARE; EQ; IF`), hand-written ones sometimes don't. Collapsing
//! every known expansion back to its macro name lets both forms fingerprint
//! the same way.
//!
//! Collapsing runs bottom-up and reduces the tail of each instruction
//! sequence as instructions are appended, so the result is a fixpoint:
//! collapsing twice gives the same tree as collapsing once.

use crate::micheline::{Micheline, Prim};

/// Comparison operators usable in `CMP*`, `IF*`, `IFCMP*` and `ASSERT_*` macros
pub const COMPARISONS: [&str; 6] = ["EQ", "NEQ", "LT", "GT", "LE", "GE"];

/// Collapse every recognized macro expansion in `value`.
pub fn collapse(value: &Micheline) -> Micheline {
    match value {
        Micheline::Seq(items) => {
            let mut out: Vec<Micheline> = Vec::with_capacity(items.len());
            for item in items {
                out.push(collapse(item));
                while reduce_tail(&mut out) {}
            }
            Micheline::Seq(out)
        }
        Micheline::Prim(p) => Micheline::Prim(Prim {
            name: p.name.clone(),
            args: p.args.iter().map(collapse).collect(),
            annots: p.annots.clone(),
        }),
        other => other.clone(),
    }
}

/// Instruction without arguments
fn bare(value: &Micheline) -> Option<&Prim> {
    value.as_prim().filter(|p| p.args.is_empty())
}

fn bare_named<'a>(value: &'a Micheline, name: &str) -> Option<&'a Prim> {
    bare(value).filter(|p| p.name == name)
}

fn comparison(name: &str) -> Option<&'static str> {
    COMPARISONS.iter().copied().find(|c| *c == name)
}

/// `A`/`D` path of `CAR`, `CDR` and already collapsed `C[AD]+R`
fn car_cdr_path(name: &str) -> Option<&str> {
    let path = name.strip_prefix('C')?.strip_suffix('R')?;
    (!path.is_empty() && path.chars().all(|c| c == 'A' || c == 'D')).then_some(path)
}

fn is_empty_seq(value: &Micheline) -> bool {
    matches!(value, Micheline::Seq(items) if items.is_empty())
}

fn is_fail_branch(value: &Micheline) -> bool {
    matches!(value, Micheline::Seq(items) if items.len() == 1 && bare_named(&items[0], "FAIL").is_some())
}

fn renamed(prim: &Prim, name: String) -> Micheline {
    Micheline::Prim(Prim {
        name,
        args: prim.args.clone(),
        annots: prim.annots.clone(),
    })
}

fn replace_tail(out: &mut Vec<Micheline>, n: usize, with: Micheline) {
    out.truncate(out.len() - n);
    out.push(with);
}

/// Try to fold the end of `out` into a macro. Returns true if it changed.
fn reduce_tail(out: &mut Vec<Micheline>) -> bool {
    let len = out.len();
    if len >= 2 {
        if let Some(replacement) = reduce_pair(&out[len - 2], &out[len - 1]) {
            replace_tail(out, 2, replacement);
            return true;
        }
    }
    if len >= 3 && is_unpair(&out[len - 3], &out[len - 2], &out[len - 1]) {
        let annots = out[len - 1]
            .as_prim()
            .map(|p| p.annots.clone())
            .unwrap_or_default();
        replace_tail(out, 3, Micheline::Prim(Prim::new("UNPAIR").with_annots(annots)));
        return true;
    }
    // after the pair rules so `COMPARE; EQ; IF` becomes IFCMPEQ before ASSERT_CMPEQ
    if let Some(replacement) = out.last().and_then(reduce_assert) {
        replace_tail(out, 1, replacement);
        return true;
    }
    false
}

/// `IF* {} { FAIL }` and friends
fn reduce_assert(value: &Micheline) -> Option<Micheline> {
    let prim = value.as_prim()?;
    let [then_branch, else_branch] = prim.args.as_slice() else {
        return None;
    };
    let then_fails = is_fail_branch(then_branch) && is_empty_seq(else_branch);
    let else_fails = is_empty_seq(then_branch) && is_fail_branch(else_branch);
    if !then_fails && !else_fails {
        return None;
    }

    let name = match (prim.name.as_str(), else_fails) {
        ("IF", true) => "ASSERT".to_string(),
        ("IF_NONE", true) => "ASSERT_NONE".to_string(),
        ("IF_NONE", false) => "ASSERT_SOME".to_string(),
        ("IF_LEFT", true) => "ASSERT_LEFT".to_string(),
        ("IF_LEFT", false) => "ASSERT_RIGHT".to_string(),
        (name, true) => {
            if let Some(op) = name.strip_prefix("IFCMP").and_then(comparison) {
                format!("ASSERT_CMP{op}")
            } else if let Some(op) = name.strip_prefix("IF").and_then(comparison) {
                format!("ASSERT_{op}")
            } else {
                return None;
            }
        }
        _ => return None,
    };
    Some(Micheline::Prim(
        Prim::new(name).with_annots(prim.annots.iter().cloned()),
    ))
}

fn reduce_pair(first: &Micheline, second: &Micheline) -> Option<Micheline> {
    let second_prim = second.as_prim()?;

    if let (Some(_), Some(op)) = (
        bare_named(first, "COMPARE"),
        bare(second).and_then(|p| comparison(&p.name)),
    ) {
        return Some(renamed(second_prim, format!("CMP{op}")));
    }

    if second_prim.name == "IF" && second_prim.args.len() == 2 {
        let first_name = bare(first)?.name.as_str();
        if let Some(op) = first_name.strip_prefix("CMP").and_then(comparison) {
            return Some(renamed(second_prim, format!("IFCMP{op}")));
        }
        if let Some(op) = comparison(first_name) {
            return Some(renamed(second_prim, format!("IF{op}")));
        }
        return None;
    }

    if bare_named(first, "UNIT").is_some() && bare_named(second, "FAILWITH").is_some() {
        return Some(renamed(second_prim, "FAIL".to_string()));
    }

    if let (Some(head), Some(tail)) = (
        bare(first).and_then(|p| car_cdr_path(&p.name)),
        bare(second).and_then(|p| car_cdr_path(&p.name)),
    ) {
        if first.as_prim().is_some_and(|p| p.annots.is_empty()) {
            return Some(renamed(second_prim, format!("C{head}{tail}R")));
        }
    }

    if second_prim.name == "SWAP" && second_prim.args.is_empty() {
        let dip = first.as_prim().filter(|p| p.name == "DIP")?;
        if let [Micheline::Seq(body)] = dip.args.as_slice() {
            if let [inner] = body.as_slice() {
                let dup = bare(inner)?;
                if let Some(us) = dup.name.strip_prefix('D').and_then(|n| n.strip_suffix('P')) {
                    if !us.is_empty() && us.chars().all(|c| c == 'U') {
                        return Some(renamed(second_prim, format!("D{us}UP")));
                    }
                }
            }
        }
    }

    None
}

fn is_unpair(first: &Micheline, second: &Micheline, third: &Micheline) -> bool {
    let dip_cdr = third.as_prim().is_some_and(|p| {
        p.name == "DIP"
            && matches!(p.args.as_slice(), [Micheline::Seq(body)]
                if body.len() == 1 && bare_named(&body[0], "CDR").is_some())
    });
    dip_cdr && bare_named(first, "DUP").is_some() && bare_named(second, "CAR").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(items: Vec<Micheline>) -> Micheline {
        Micheline::Seq(items)
    }

    fn p(name: &str) -> Micheline {
        Micheline::prim(name)
    }

    fn names(value: &Micheline) -> Vec<String> {
        match value {
            Micheline::Seq(items) => items
                .iter()
                .filter_map(|i| i.as_prim().map(|p| p.name.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_compare_and_branch() {
        let code = seq(vec![
            p("COMPARE"),
            p("EQ"),
            Micheline::prim_args("IF", vec![seq(vec![]), seq(vec![p("DROP")])]),
        ]);
        assert_eq!(names(&collapse(&code)), vec!["IFCMPEQ"]);
    }

    #[test]
    fn test_plain_if_comparison() {
        let code = seq(vec![
            p("LT"),
            Micheline::prim_args("IF", vec![seq(vec![p("DROP")]), seq(vec![])]),
        ]);
        assert_eq!(names(&collapse(&code)), vec!["IFLT"]);
    }

    #[test]
    fn test_fail_and_assert() {
        let code = seq(vec![
            p("COMPARE"),
            p("GE"),
            Micheline::prim_args(
                "IF",
                vec![seq(vec![]), seq(vec![p("UNIT"), p("FAILWITH")])],
            ),
        ]);
        assert_eq!(names(&collapse(&code)), vec!["ASSERT_CMPGE"]);

        let none = seq(vec![Micheline::prim_args(
            "IF_NONE",
            vec![seq(vec![p("UNIT"), p("FAILWITH")]), seq(vec![])],
        )]);
        assert_eq!(names(&collapse(&none)), vec!["ASSERT_SOME"]);
    }

    #[test]
    fn test_car_cdr_paths() {
        let code = seq(vec![p("CAR"), p("CDR"), p("CDR"), p("SWAP"), p("CAR")]);
        assert_eq!(names(&collapse(&code)), vec!["CADDR", "SWAP", "CAR"]);
    }

    #[test]
    fn test_unpair_and_duup() {
        let code = seq(vec![
            p("DUP"),
            p("CAR"),
            Micheline::prim_args("DIP", vec![seq(vec![p("CDR")])]),
            Micheline::prim_args("DIP", vec![seq(vec![p("DUP")])]),
            p("SWAP"),
        ]);
        assert_eq!(names(&collapse(&code)), vec!["UNPAIR", "DUUP"]);
    }

    #[test]
    fn test_collapse_is_idempotent() {
        let code = seq(vec![
            p("DUP"),
            p("CAR"),
            Micheline::prim_args("DIP", vec![seq(vec![p("CDR")])]),
            p("COMPARE"),
            p("NEQ"),
            Micheline::prim_args(
                "IF",
                vec![seq(vec![p("CAR"), p("CAR")]), seq(vec![p("UNIT"), p("FAILWITH")])],
            ),
        ]);
        let once = collapse(&code);
        assert_eq!(collapse(&once), once);
    }

    #[test]
    fn test_literals_untouched() {
        let value = Micheline::prim_args("Pair", vec![Micheline::int(1), Micheline::string("x")]);
        assert_eq!(collapse(&value), value);
    }
}
