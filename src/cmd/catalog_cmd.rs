//! Catalog inspection and program checking.

use std::path::Path;

use crate::{unconsumed_categories, CallgenResult, Program, Target};

pub fn catalog_summary(target: &Target) -> serde_json::Value {
    let descriptors: Vec<serde_json::Value> = target
        .descriptors()
        .iter()
        .map(|d| {
            serde_json::json!({
                "name": d.name,
                "args": d.args.len(),
                "ret": d.ret,
                "consumes": d.consumed_kinds().collect::<Vec<_>>(),
            })
        })
        .collect();
    let resources: Vec<serde_json::Value> = target
        .resources()
        .iter()
        .map(|r| {
            serde_json::json!({
                "name": r.name,
                "default": r.default_value(),
                "producers": target
                    .producers_of(&r.name)
                    .iter()
                    .map(|&i| target.descriptor(i).name.as_str())
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    serde_json::json!({
        "name": target.name(),
        "descriptors": descriptors,
        "resources": resources,
    })
}

/// Reads a program (JSON) and reports whether it is structurally valid.
/// With `fix` set, the repair pass runs first.
pub fn check_program(target: &Target, path: &Path, fix: bool) -> CallgenResult<serde_json::Value> {
    let text = std::fs::read_to_string(path)?;
    let mut program: Program = serde_json::from_str(&text)?;
    let fixed = if fix { program.sanitize_fix(target) } else { 0 };
    let unconsumed: Vec<_> = unconsumed_categories(&program).iter().collect();
    let out = match program.validate(target) {
        Ok(()) => serde_json::json!({
            "valid": true,
            "calls": program.len(),
            "fixed": fixed,
            "unconsumed": unconsumed,
        }),
        Err(err) => serde_json::json!({
            "valid": false,
            "calls": program.len(),
            "fixed": fixed,
            "unconsumed": unconsumed,
            "error": err.to_string(),
        }),
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{generate, RandSource, Verify};

    #[test]
    fn summary_lists_producers() {
        let summary = catalog_summary(&Target::builtin());
        let fd = summary["resources"]
            .as_array()
            .expect("resources")
            .iter()
            .find(|r| r["name"] == "fd")
            .expect("fd");
        assert_eq!(fd["producers"], serde_json::json!(["open", "dup"]));
    }

    #[test]
    fn check_reports_validity_and_fixes() {
        let target = Target::builtin();
        let dir = std::env::temp_dir().join(format!("callgen-check-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("dir");

        let mut p = generate(&target, &mut RandSource::from_seed(12), 8, None, Verify::Panic);
        let good = dir.join("good.json");
        std::fs::write(&good, serde_json::to_vec_pretty(&p).expect("json")).expect("write");
        let out = check_program(&target, &good, false).expect("check");
        assert_eq!(out["valid"], true);
        assert_eq!(out["calls"], 8);

        p.calls.reverse();
        p.calls[0].name = "sync".to_string();
        p.calls[0].args.clear();
        p.calls[1].args.push(crate::Arg::Const { value: 1 });
        let bad = dir.join("bad.json");
        std::fs::write(&bad, serde_json::to_vec_pretty(&p).expect("json")).expect("write");
        let out = check_program(&target, &bad, false).expect("check");
        assert_eq!(out["valid"], false);

        let out = check_program(&target, &bad, true).expect("check");
        assert_eq!(out["valid"], true);
        assert!(out["fixed"].as_u64().expect("fixed") > 0);
    }
}
