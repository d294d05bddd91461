//! Descriptor catalog (`Target`): the fixed set of callable operations a
//! program may draw from, plus the resource kinds those operations exchange.

use serde::{Deserialize, Serialize};

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::{CallgenError, CallgenResult, Program};

pub type DescriptorIdx = usize;

const DEFAULT_BUFFER_LEN: usize = 64;

/// Shape of a single call argument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArgKind {
    Int {
        #[serde(default)]
        min: u64,
        #[serde(default = "default_int_max")]
        max: u64,
    },
    /// Any bitwise OR of the listed values.
    Flags { values: Vec<u64> },
    Buffer {
        #[serde(default = "default_buffer_len")]
        max_len: usize,
    },
    /// Consumes a resource of `kind`. With `release` set the call ends the
    /// resource's lifetime.
    Resource {
        kind: String,
        #[serde(default)]
        release: bool,
    },
}

fn default_int_max() -> u64 {
    u64::MAX
}

fn default_buffer_len() -> usize {
    DEFAULT_BUFFER_LEN
}

impl ArgKind {
    pub fn resource_kind(&self) -> Option<&str> {
        match self {
            Self::Resource { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Union of all flag bits, if this is a flags argument.
    pub fn flags_mask(&self) -> Option<u64> {
        match self {
            Self::Flags { values } => Some(values.iter().fold(0u64, |acc, v| acc | v)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArgDesc {
    pub name: String,
    #[serde(flatten)]
    pub kind: ArgKind,
}

impl ArgDesc {
    pub fn new(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Static definition of one callable operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Descriptor {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ArgDesc>,
    /// Resource kind created by a successful call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ret: Option<String>,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, args: Vec<ArgDesc>, ret: Option<&str>) -> Self {
        Self {
            name: name.into(),
            args,
            ret: ret.map(str::to_string),
        }
    }

    /// Resource kinds this descriptor takes as input.
    pub fn consumed_kinds(&self) -> impl Iterator<Item = &str> + '_ {
        self.args.iter().filter_map(|a| a.kind.resource_kind())
    }

    /// Every resource kind the descriptor touches, produced or consumed.
    pub fn touched_kinds(&self) -> BTreeSet<&str> {
        let mut out: BTreeSet<&str> = self.consumed_kinds().collect();
        if let Some(ret) = &self.ret {
            out.insert(ret);
        }
        out
    }
}

/// A logical resource type, e.g. a file descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceKind {
    pub name: String,
    /// Special values usable when no live instance exists. The first one is
    /// the default substituted for neutralized references.
    #[serde(default)]
    pub special: Vec<u64>,
}

impl ResourceKind {
    pub fn new(name: impl Into<String>, special: Vec<u64>) -> Self {
        Self {
            name: name.into(),
            special,
        }
    }

    pub fn default_value(&self) -> u64 {
        self.special.first().copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogFile {
    name: String,
    #[serde(default)]
    resources: Vec<ResourceKind>,
    #[serde(default, alias = "syscalls")]
    descriptors: Vec<Descriptor>,
}

/// Validated, read-only descriptor catalog.
#[derive(Debug, Clone)]
pub struct Target {
    name: String,
    resources: Vec<ResourceKind>,
    descriptors: Vec<Descriptor>,
    by_name: BTreeMap<String, DescriptorIdx>,
    producers: BTreeMap<String, Vec<DescriptorIdx>>,
}

impl Target {
    pub fn new(
        name: impl Into<String>,
        resources: Vec<ResourceKind>,
        descriptors: Vec<Descriptor>,
    ) -> CallgenResult<Self> {
        let name = name.into();
        let mut kinds = BTreeSet::new();
        for r in &resources {
            if r.name.trim().is_empty() {
                return Err(CallgenError::Catalog("resource kind with empty name".to_string()));
            }
            if !kinds.insert(r.name.as_str()) {
                return Err(CallgenError::Catalog(format!("duplicate resource kind {:?}", r.name)));
            }
        }

        let mut by_name = BTreeMap::new();
        let mut producers: BTreeMap<String, Vec<DescriptorIdx>> = BTreeMap::new();
        for (idx, d) in descriptors.iter().enumerate() {
            if d.name.trim().is_empty() {
                return Err(CallgenError::Catalog(format!("descriptor #{idx} has an empty name")));
            }
            if by_name.insert(d.name.clone(), idx).is_some() {
                return Err(CallgenError::Catalog(format!("duplicate descriptor {:?}", d.name)));
            }
            for a in &d.args {
                check_arg(&d.name, a, &kinds)?;
            }
            if let Some(ret) = &d.ret {
                if !kinds.contains(ret.as_str()) {
                    return Err(CallgenError::Catalog(format!(
                        "{}: returns undeclared resource kind {ret:?}",
                        d.name
                    )));
                }
                producers.entry(ret.clone()).or_default().push(idx);
            }
        }

        Ok(Self {
            name,
            resources,
            descriptors,
            by_name,
            producers,
        })
    }

    /// Loads a catalog from a `.json` or `.toml` file.
    pub fn load(path: &Path) -> CallgenResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let file: CatalogFile = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&text)?,
            Some("toml") => toml::from_str(&text)?,
            other => {
                return Err(CallgenError::InvalidArgument(format!(
                    "unsupported catalog format {other:?} for {} (expected .json or .toml)",
                    path.display()
                )))
            }
        };
        Self::new(file.name, file.resources, file.descriptors)
    }

    /// Small file/mount oriented catalog used by the CLI when no catalog file
    /// is configured.
    pub fn builtin() -> Self {
        use ArgKind::*;

        let fd = || Resource {
            kind: "fd".to_string(),
            release: false,
        };
        let buf = |max_len| Buffer { max_len };
        let resources = vec![
            ResourceKind::new("fd", vec![u64::MAX, 0, 1, 2]),
            ResourceKind::new("mnt", vec![0]),
        ];
        let descriptors = vec![
            Descriptor::new(
                "open",
                vec![
                    ArgDesc::new("path", buf(64)),
                    ArgDesc::new(
                        "flags",
                        Flags {
                            values: vec![0x0, 0x1, 0x2, 0x40, 0x80, 0x200, 0x400, 0x80000],
                        },
                    ),
                    ArgDesc::new("mode", Int { min: 0, max: 0o777 }),
                ],
                Some("fd"),
            ),
            Descriptor::new(
                "close",
                vec![ArgDesc::new(
                    "fd",
                    Resource {
                        kind: "fd".to_string(),
                        release: true,
                    },
                )],
                None,
            ),
            Descriptor::new(
                "read",
                vec![
                    ArgDesc::new("fd", fd()),
                    ArgDesc::new("buf", buf(4096)),
                    ArgDesc::new("count", Int { min: 0, max: 4096 }),
                ],
                None,
            ),
            Descriptor::new(
                "write",
                vec![
                    ArgDesc::new("fd", fd()),
                    ArgDesc::new("buf", buf(4096)),
                    ArgDesc::new("count", Int { min: 0, max: 4096 }),
                ],
                None,
            ),
            Descriptor::new(
                "lseek",
                vec![
                    ArgDesc::new("fd", fd()),
                    ArgDesc::new("offset", Int { min: 0, max: u64::MAX }),
                    ArgDesc::new("whence", Flags { values: vec![0, 1, 2] }),
                ],
                None,
            ),
            Descriptor::new("dup", vec![ArgDesc::new("oldfd", fd())], Some("fd")),
            Descriptor::new(
                "fstat",
                vec![ArgDesc::new("fd", fd()), ArgDesc::new("statbuf", buf(144))],
                None,
            ),
            Descriptor::new(
                "ioctl",
                vec![
                    ArgDesc::new("fd", fd()),
                    ArgDesc::new("cmd", Int { min: 0, max: 0xffff_ffff }),
                    ArgDesc::new("arg", Int { min: 0, max: u64::MAX }),
                ],
                None,
            ),
            Descriptor::new(
                "mount",
                vec![
                    ArgDesc::new("source", buf(64)),
                    ArgDesc::new("target", buf(64)),
                    ArgDesc::new("fstype", buf(16)),
                    ArgDesc::new(
                        "flags",
                        Flags {
                            values: vec![0x1, 0x2, 0x4, 0x8, 0x400, 0x1000, 0x4000],
                        },
                    ),
                ],
                Some("mnt"),
            ),
            Descriptor::new(
                "unmount",
                vec![
                    ArgDesc::new(
                        "target",
                        Resource {
                            kind: "mnt".to_string(),
                            release: true,
                        },
                    ),
                    ArgDesc::new("flags", Flags { values: vec![0x1, 0x2, 0x4, 0x8] }),
                ],
                None,
            ),
            Descriptor::new("sync", Vec::new(), None),
        ];

        match Self::new("builtin", resources, descriptors) {
            Ok(target) => target,
            Err(err) => unreachable!("builtin catalog is well-formed: {err}"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, idx: DescriptorIdx) -> &Descriptor {
        &self.descriptors[idx]
    }

    pub fn resources(&self) -> &[ResourceKind] {
        &self.resources
    }

    pub fn lookup(&self, name: &str) -> Option<DescriptorIdx> {
        self.by_name.get(name).copied()
    }

    pub fn descriptor_by_name(&self, name: &str) -> Option<&Descriptor> {
        self.lookup(name).map(|idx| &self.descriptors[idx])
    }

    /// Descriptors whose successful call creates a resource of `kind`.
    pub fn producers_of(&self, kind: &str) -> &[DescriptorIdx] {
        self.producers.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn resource(&self, kind: &str) -> Option<&ResourceKind> {
        self.resources.iter().find(|r| r.name == kind)
    }

    /// Value substituted for a resource argument with no live producer.
    pub fn default_value(&self, kind: &str) -> u64 {
        self.resource(kind).map(ResourceKind::default_value).unwrap_or(0)
    }

    /// Empty program bound to this catalog.
    pub fn new_program(&self) -> Program {
        Program::new(&self.name)
    }
}

fn check_arg(call: &str, arg: &ArgDesc, kinds: &BTreeSet<&str>) -> CallgenResult<()> {
    match &arg.kind {
        ArgKind::Int { min, max } if min > max => Err(CallgenError::Catalog(format!(
            "{call}.{}: int range min {min} exceeds max {max}",
            arg.name
        ))),
        ArgKind::Flags { values } if values.is_empty() => Err(CallgenError::Catalog(format!(
            "{call}.{}: flags argument without values",
            arg.name
        ))),
        ArgKind::Resource { kind, .. } if !kinds.contains(kind.as_str()) => Err(CallgenError::Catalog(
            format!("{call}.{}: undeclared resource kind {kind:?}", arg.name),
        )),
        _ => Ok(()),
    }
}
