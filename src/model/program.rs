//! Programs: ordered call sequences bound to a catalog.

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::{ArgDesc, ArgKind, CallgenError, CallgenResult, Target};

/// Program-unique, stable identity of a call. Survives removal of other calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub u32);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceSource {
    /// Result of an earlier call in the same program.
    Call(CallId),
    /// Special value standing in for a missing resource.
    Default(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Arg {
    Const {
        value: u64,
    },
    Data {
        #[serde(with = "hex_bytes")]
        bytes: Vec<u8>,
    },
    Resource {
        kind: String,
        source: ResourceSource,
    },
}

impl Arg {
    /// The call whose result this argument uses, if any.
    pub fn referenced_call(&self) -> Option<CallId> {
        match self {
            Self::Resource {
                source: ResourceSource::Call(id),
                ..
            } => Some(*id),
            _ => None,
        }
    }

    /// Type-appropriate default for an argument of shape `desc`.
    pub fn default_for(target: &Target, desc: &ArgDesc) -> Self {
        match &desc.kind {
            ArgKind::Int { min, .. } => Self::Const { value: *min },
            ArgKind::Flags { .. } => Self::Const { value: 0 },
            ArgKind::Buffer { .. } => Self::Data { bytes: Vec::new() },
            ArgKind::Resource { kind, .. } => Self::Resource {
                kind: kind.clone(),
                source: ResourceSource::Default(target.default_value(kind)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub name: String,
    #[serde(default)]
    pub args: Vec<Arg>,
}

/// Self-check behaviour of [`Program::debug_validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verify {
    Off,
    Panic,
}

impl Default for Verify {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::Off
        }
    }
}

impl clap::ValueEnum for Verify {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Off, Self::Panic]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(match self {
            Self::Off => clap::builder::PossibleValue::new("off"),
            Self::Panic => clap::builder::PossibleValue::new("panic"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub target: String,
    pub calls: Vec<Call>,
    /// Scheduling priority inside a task batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
}

impl Program {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            calls: Vec::new(),
            priority: None,
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn call_names(&self) -> Vec<&str> {
        self.calls.iter().map(|c| c.name.as_str()).collect()
    }

    /// Removes the call at `index`. Later arguments that used its result are
    /// rewritten to the resource kind's default value.
    pub fn remove_call(&mut self, target: &Target, index: usize) -> Call {
        let removed = self.calls.remove(index);
        for c in &mut self.calls[index..] {
            for arg in &mut c.args {
                if let Arg::Resource { kind, source } = arg {
                    if *source == ResourceSource::Call(removed.id) {
                        *source = ResourceSource::Default(target.default_value(kind));
                    }
                }
            }
        }
        removed
    }

    /// Normalizes structurally inconsistent arguments to valid values.
    /// Returns the number of arguments rewritten.
    pub fn sanitize_fix(&mut self, target: &Target) -> usize {
        let mut fixed = 0usize;
        let mut produced: BTreeMap<CallId, Option<String>> = BTreeMap::new();

        for c in &mut self.calls {
            let Some(desc) = target.descriptor_by_name(&c.name) else {
                produced.insert(c.id, None);
                continue;
            };

            if c.args.len() != desc.args.len() {
                fixed += c.args.len().abs_diff(desc.args.len());
                c.args.truncate(desc.args.len());
                for a in &desc.args[c.args.len()..] {
                    c.args.push(Arg::default_for(target, a));
                }
            }

            for (arg, ad) in c.args.iter_mut().zip(&desc.args) {
                if let Some(repaired) = fix_arg(target, arg, ad, &produced) {
                    *arg = repaired;
                    fixed += 1;
                }
            }
            produced.insert(c.id, desc.ret.clone());
        }

        if fixed > 0 {
            tracing::debug!(fixed, "sanitized program arguments");
        }
        fixed
    }

    /// Structural check: known descriptors, matching argument shapes, unique
    /// ids, and resource references that point at an earlier producer of the
    /// right kind.
    pub fn validate(&self, target: &Target) -> CallgenResult<()> {
        let mut produced: BTreeMap<CallId, Option<&str>> = BTreeMap::new();
        for (i, c) in self.calls.iter().enumerate() {
            if produced.contains_key(&c.id) {
                return Err(CallgenError::Program(format!("call #{i}: duplicate id {}", c.id)));
            }
            let desc = target.descriptor_by_name(&c.name).ok_or_else(|| {
                CallgenError::Program(format!("call #{i}: unknown descriptor {:?}", c.name))
            })?;
            if c.args.len() != desc.args.len() {
                return Err(CallgenError::Program(format!(
                    "call #{i} {}: expected {} args, got {}",
                    c.name,
                    desc.args.len(),
                    c.args.len()
                )));
            }
            for (arg, ad) in c.args.iter().zip(&desc.args) {
                check_arg(i, &c.name, arg, ad, &produced)?;
            }
            produced.insert(c.id, desc.ret.as_deref());
        }
        Ok(())
    }

    /// Assertion-style self check. With [`Verify::Panic`] a structural defect
    /// is a generator bug and aborts; with [`Verify::Off`] this is a no-op.
    pub fn debug_validate(&self, target: &Target, verify: Verify) {
        if verify == Verify::Off {
            return;
        }
        if let Err(err) = self.validate(target) {
            panic!("generated program failed self-validation: {err}\n{self}");
        }
    }

    fn referenced_ids(&self) -> BTreeSet<CallId> {
        self.calls
            .iter()
            .flat_map(|c| c.args.iter().filter_map(Arg::referenced_call))
            .collect()
    }
}

fn fix_arg(
    target: &Target,
    arg: &Arg,
    desc: &ArgDesc,
    produced: &BTreeMap<CallId, Option<String>>,
) -> Option<Arg> {
    match (&desc.kind, arg) {
        (ArgKind::Int { min, max }, Arg::Const { value }) => {
            let clamped = (*value).clamp(*min, *max);
            (clamped != *value).then_some(Arg::Const { value: clamped })
        }
        (ArgKind::Flags { .. }, Arg::Const { value }) => {
            let mask = desc.kind.flags_mask().unwrap_or(0);
            (value & !mask != 0).then_some(Arg::Const { value: value & mask })
        }
        (ArgKind::Buffer { max_len }, Arg::Data { bytes }) => (bytes.len() > *max_len).then(|| Arg::Data {
            bytes: bytes[..*max_len].to_vec(),
        }),
        (ArgKind::Resource { kind: want, .. }, Arg::Resource { kind, source }) => {
            let ok = kind == want
                && match source {
                    ResourceSource::Default(_) => true,
                    ResourceSource::Call(id) => {
                        matches!(produced.get(id), Some(Some(k)) if k == want)
                    }
                };
            (!ok).then(|| Arg::default_for(target, desc))
        }
        _ => Some(Arg::default_for(target, desc)),
    }
}

fn check_arg(
    index: usize,
    call: &str,
    arg: &Arg,
    desc: &ArgDesc,
    produced: &BTreeMap<CallId, Option<&str>>,
) -> CallgenResult<()> {
    let bad = |msg: String| Err(CallgenError::Program(format!("call #{index} {call}.{}: {msg}", desc.name)));
    match (&desc.kind, arg) {
        (ArgKind::Int { min, max }, Arg::Const { value }) => {
            if value < min || value > max {
                return bad(format!("value {value:#x} outside [{min:#x}, {max:#x}]"));
            }
        }
        (ArgKind::Flags { .. }, Arg::Const { value }) => {
            let mask = desc.kind.flags_mask().unwrap_or(0);
            if value & !mask != 0 {
                return bad(format!("flags {value:#x} outside mask {mask:#x}"));
            }
        }
        (ArgKind::Buffer { max_len }, Arg::Data { bytes }) => {
            if bytes.len() > *max_len {
                return bad(format!("buffer of {} bytes exceeds {max_len}", bytes.len()));
            }
        }
        (ArgKind::Resource { kind: want, .. }, Arg::Resource { kind, source }) => {
            if kind != want {
                return bad(format!("resource kind {kind:?}, expected {want:?}"));
            }
            if let ResourceSource::Call(id) = source {
                match produced.get(id) {
                    None => return bad(format!("reference to {id} which is not an earlier call")),
                    Some(Some(k)) if k == want => {}
                    Some(_) => return bad(format!("{id} does not produce {want:?}")),
                }
            }
        }
        _ => return bad("argument shape does not match descriptor".to_string()),
    }
    Ok(())
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let referenced = self.referenced_ids();
        for c in &self.calls {
            if referenced.contains(&c.id) {
                write!(f, "{} = ", c.id)?;
            }
            write!(f, "{}(", c.name)?;
            for (i, a) in c.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match a {
                    Arg::Const { value } => write!(f, "{value:#x}")?,
                    Arg::Data { bytes } => write!(f, "\"{}\"", hex_bytes::encode(bytes))?,
                    Arg::Resource {
                        source: ResourceSource::Call(id),
                        ..
                    } => write!(f, "{id}")?,
                    Arg::Resource {
                        source: ResourceSource::Default(v),
                        ..
                    } => write!(f, "{v:#x}")?,
                }
            }
            writeln!(f, ")")?;
        }
        Ok(())
    }
}

mod hex_bytes {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        if s.len() % 2 != 0 || !s.is_ascii() {
            return Err(D::Error::custom("invalid hex string"));
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(D::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fd_ref(id: u32) -> Arg {
        Arg::Resource {
            kind: "fd".to_string(),
            source: ResourceSource::Call(CallId(id)),
        }
    }

    fn open(id: u32) -> Call {
        Call {
            id: CallId(id),
            name: "open".to_string(),
            args: vec![
                Arg::Data { bytes: b"/tmp/a".to_vec() },
                Arg::Const { value: 0x2 },
                Arg::Const { value: 0o644 },
            ],
        }
    }

    fn close(id: u32, fd: u32) -> Call {
        Call {
            id: CallId(id),
            name: "close".to_string(),
            args: vec![fd_ref(fd)],
        }
    }

    #[test]
    fn remove_call_defaults_dangling_references() {
        let target = Target::builtin();
        let mut p = target.new_program();
        p.calls = vec![open(0), open(1), close(2, 0), close(3, 1)];
        p.validate(&target).expect("valid");

        let removed = p.remove_call(&target, 0);
        assert_eq!(removed.id, CallId(0));
        assert_eq!(
            p.calls[1].args[0],
            Arg::Resource {
                kind: "fd".to_string(),
                source: ResourceSource::Default(u64::MAX),
            }
        );
        assert_eq!(p.calls[2].args[0], fd_ref(1));
        p.validate(&target).expect("still valid");
    }

    #[test]
    fn validate_rejects_forward_and_mistyped_references() {
        let target = Target::builtin();
        let mut p = target.new_program();
        p.calls = vec![close(0, 1), open(1)];
        let err = p.validate(&target).expect_err("forward ref");
        assert!(err.to_string().contains("not an earlier call"));

        p.calls = vec![
            Call {
                id: CallId(0),
                name: "sync".to_string(),
                args: Vec::new(),
            },
            close(1, 0),
        ];
        let err = p.validate(&target).expect_err("wrong producer");
        assert!(err.to_string().contains("does not produce"));
    }

    #[test]
    fn sanitize_fix_repairs_shapes_and_ranges() {
        let target = Target::builtin();
        let mut p = target.new_program();
        let mut bad_open = open(0);
        bad_open.args[1] = Arg::Const { value: 0xdead_0000 };
        bad_open.args[2] = Arg::Const { value: 0o7777 };
        bad_open.args.push(Arg::Const { value: 1 });
        p.calls = vec![
            bad_open,
            close(1, 7),
            Call {
                id: CallId(2),
                name: "read".to_string(),
                args: vec![Arg::Const { value: 3 }],
            },
        ];

        let fixed = p.sanitize_fix(&target);
        assert!(fixed >= 5, "fixed {fixed}");
        p.validate(&target).expect("valid after sanitize");
        assert_eq!(p.calls[0].args.len(), 3);
        assert_eq!(p.calls[0].args[2], Arg::Const { value: 0o777 });
        assert_eq!(p.calls[2].args.len(), 3);
        assert_eq!(p.sanitize_fix(&target), 0);
    }

    #[test]
    #[should_panic(expected = "failed self-validation")]
    fn debug_validate_panics_when_verifying() {
        let target = Target::builtin();
        let mut p = target.new_program();
        p.calls = vec![close(0, 9)];
        p.debug_validate(&target, Verify::Off);
        p.debug_validate(&target, Verify::Panic);
    }

    #[test]
    fn renders_and_round_trips_json() {
        let target = Target::builtin();
        let mut p = target.new_program();
        p.calls = vec![open(0), close(1, 0)];
        assert_eq!(p.to_string(), "r0 = open(\"2f746d702f61\", 0x2, 0x1a4)\nclose(r0)\n");

        let json = serde_json::to_string(&p).expect("json");
        let back: Program = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, p);
    }
}
