//! Script fingerprinting
//!
//! A fingerprint is a literal-free canonical string for each section of a
//! contract script. Every primitive contributes a two hex digit opcode; the
//! values of literals, annotations and macro sugar do not contribute, so two
//! contracts differing only in constants share the same fingerprint.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::macros::{collapse, COMPARISONS};
use crate::micheline::{Micheline, ScriptShapeError};
use crate::primitives;

/// Errors that can occur during fingerprinting
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("unknown script shape: {0}")]
    UnknownScriptShape(String),
}

impl From<ScriptShapeError> for FingerprintError {
    fn from(err: ScriptShapeError) -> Self {
        match err {
            ScriptShapeError::UnknownScriptShape(s) => Self::UnknownScriptShape(s),
        }
    }
}

/// Instructions dropped from code fingerprints together with their arguments
const CODE_SKIP: [&str; 2] = ["CAST", "RENAME"];
/// Type constructors that contribute only their arguments
const TYPE_PASS: [&str; 2] = ["pair", "or"];

/// How a macro family renders its opcode
#[derive(Debug, Clone, Copy)]
enum FamilyParam {
    None,
    /// comparison operator captured in group 1
    Comparison,
    /// `A`/`D` path captured in group 1
    Path,
}

struct MacroFamily {
    pattern: Regex,
    opcode: &'static str,
    param: FamilyParam,
}

fn family(pattern: &str, opcode: &'static str, param: FamilyParam) -> MacroFamily {
    MacroFamily {
        pattern: Regex::new(pattern).expect("macro family pattern"),
        opcode,
        param,
    }
}

static MACRO_FAMILIES: Lazy<Vec<MacroFamily>> = Lazy::new(|| {
    let cmp = COMPARISONS.join("|");
    vec![
        family(&format!("^CMP({cmp})$"), "c0", FamilyParam::Comparison),
        family(&format!("^IF({cmp})$"), "c1", FamilyParam::Comparison),
        family(&format!("^IFCMP({cmp})$"), "c2", FamilyParam::Comparison),
        family("^FAIL$", "c3", FamilyParam::None),
        family("^ASSERT$", "c4", FamilyParam::None),
        family(&format!("^ASSERT_({cmp})$"), "c5", FamilyParam::Comparison),
        family(&format!("^ASSERT_CMP({cmp})$"), "c6", FamilyParam::Comparison),
        family("^ASSERT_NONE$", "c7", FamilyParam::None),
        family("^ASSERT_SOME$", "c8", FamilyParam::None),
        family("^ASSERT_LEFT$", "c9", FamilyParam::None),
        family("^ASSERT_RIGHT$", "ca", FamilyParam::None),
        family("^IF_SOME$", "cb", FamilyParam::None),
        family("^IF_RIGHT$", "cc", FamilyParam::None),
        family("^C([AD]{2,})R$", "cd", FamilyParam::Path),
        family("^DU{2,}P$", "ce", FamilyParam::None),
        family("^DI{2,}P$", "cf", FamilyParam::None),
        family("^SET_C([AD]+)R$", "d0", FamilyParam::Path),
        family("^MAP_C([AD]+)R$", "d1", FamilyParam::Path),
    ]
});

fn keyword_opcode(name: &str) -> Option<String> {
    primitives::index_of(name).map(|i| format!("{i:02x}"))
}

/// Opcode for a primitive or macro name.
pub fn opcode(name: &str) -> Result<String, FingerprintError> {
    if let Some(code) = keyword_opcode(name) {
        return Ok(code);
    }

    for family in MACRO_FAMILIES.iter() {
        let Some(caps) = family.pattern.captures(name) else {
            continue;
        };
        let mut code = family.opcode.to_string();
        let param = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        match family.param {
            FamilyParam::None => {}
            FamilyParam::Comparison => code.push_str(&keyword_opcode(param).unwrap_or_default()),
            FamilyParam::Path => {
                for step in param.chars() {
                    let step = if step == 'A' { "CAR" } else { "CDR" };
                    code.push_str(&keyword_opcode(step).unwrap_or_default());
                }
            }
        }
        return Ok(code);
    }

    Err(FingerprintError::UnknownScriptShape(format!(
        "unknown primitive {name:?}"
    )))
}

/// Fingerprint one script section. `is_code` selects code rules (skip
/// `CAST`/`RENAME`) over type rules (pass through `pair`/`or`).
pub fn fingerprint(section: &Micheline, is_code: bool) -> Result<String, FingerprintError> {
    let collapsed = collapse(section);
    let mut out = String::new();
    write_fingerprint(&collapsed, is_code, &mut out)?;
    Ok(out)
}

fn write_fingerprint(
    node: &Micheline,
    is_code: bool,
    out: &mut String,
) -> Result<(), FingerprintError> {
    match node {
        Micheline::Seq(items) => {
            for item in items {
                write_fingerprint(item, is_code, out)?;
            }
        }
        Micheline::Prim(prim) => {
            if is_code && CODE_SKIP.contains(&prim.name.as_str()) {
                return Ok(());
            }
            if is_code || !TYPE_PASS.contains(&prim.name.as_str()) {
                out.push_str(&opcode(&prim.name)?);
            }
            for arg in &prim.args {
                write_fingerprint(arg, is_code, out)?;
            }
        }
        // literal carriers: only the kind of literal counts
        Micheline::Int(_) => out.push_str(&opcode("int")?),
        Micheline::String(_) => out.push_str(&opcode("string")?),
        Micheline::Bytes(_) => out.push_str(&opcode("bytes")?),
    }
    Ok(())
}

/// Script section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Parameter,
    Storage,
    Code,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Parameter, Section::Storage, Section::Code];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Parameter => "parameter",
            Self::Storage => "storage",
            Self::Code => "code",
        }
    }
}

/// The three sections of an on-chain script
#[derive(Debug, Clone, Copy)]
pub struct ScriptSections<'a> {
    pub parameter: &'a Micheline,
    pub storage: &'a Micheline,
    pub code: &'a Micheline,
}

impl<'a> ScriptSections<'a> {
    /// Split a script (`[parameter, storage, code, ...]` in any order).
    pub fn from_script(script: &'a Micheline) -> Result<Self, FingerprintError> {
        let Micheline::Seq(items) = script else {
            return Err(FingerprintError::UnknownScriptShape(
                "script is not a sequence".to_string(),
            ));
        };

        let find = |section: Section| {
            items
                .iter()
                .filter_map(Micheline::as_prim)
                .find(|p| p.name == section.name())
                .and_then(|p| p.args.first())
                .ok_or_else(|| {
                    FingerprintError::UnknownScriptShape(format!(
                        "missing {} section",
                        section.name()
                    ))
                })
        };

        Ok(Self {
            parameter: find(Section::Parameter)?,
            storage: find(Section::Storage)?,
            code: find(Section::Code)?,
        })
    }
}

/// Per-section fingerprints of a contract
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fingerprint {
    pub parameter: String,
    pub storage: String,
    pub code: String,
}

impl Fingerprint {
    /// Fingerprint already split sections.
    pub fn new(
        parameter: &Micheline,
        storage: &Micheline,
        code: &Micheline,
    ) -> Result<Self, FingerprintError> {
        Ok(Self {
            parameter: fingerprint(parameter, false)?,
            storage: fingerprint(storage, false)?,
            code: fingerprint(code, true)?,
        })
    }

    pub fn from_sections(sections: &ScriptSections) -> Result<Self, FingerprintError> {
        Self::new(sections.parameter, sections.storage, sections.code)
    }

    /// Fingerprint a whole script.
    pub fn from_script(script: &Micheline) -> Result<Self, FingerprintError> {
        Self::from_sections(&ScriptSections::from_script(script)?)
    }

    pub fn section(&self, section: Section) -> &str {
        match section {
            Section::Parameter => &self.parameter,
            Section::Storage => &self.storage,
            Section::Code => &self.code,
        }
    }

    /// Every section is a sequence of two-digit lowercase hex opcodes.
    pub fn is_well_formed(&self) -> bool {
        Section::ALL.iter().all(|s| {
            let fp = self.section(*s);
            fp.len() % 2 == 0 && fp.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        })
    }
}
