//! ProGuard/R8 mapping support.
//!
//! Translates the obfuscated names observed on the wire back to the original
//! source names, and original field names back to their obfuscated form so
//! user-supplied inspection paths keep working on shrunken builds. Method
//! disambiguation only has arity to go on, since `mapping.txt` drops generic
//! and receiver information.

use std::collections::HashMap;
use std::io;
use std::path::Path;

/// Bidirectional class/member name dictionary parsed from a `mapping.txt`.
pub struct Mapping {
    class_by_obf: HashMap<String, String>,
    class_by_orig: HashMap<String, String>,
    /// `(obf class, obf field) -> original field`
    fields_by_obf: HashMap<(String, String), String>,
    /// `(obf class, original field) -> obf field`
    fields_by_orig: HashMap<(String, String), String>,
    /// `(obf class, obf method) -> [(arity, original method)]`
    methods_by_obf: HashMap<(String, String), Vec<(usize, String)>>,
    member_count: usize,
}

impl Mapping {
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    /// Parse mapping text. Unrecognized lines are skipped, matching how the
    /// rest of the toolchain treats hand-edited mapping files.
    pub fn parse(text: &str) -> Self {
        let mut mapping = Self {
            class_by_obf: HashMap::new(),
            class_by_orig: HashMap::new(),
            fields_by_obf: HashMap::new(),
            fields_by_orig: HashMap::new(),
            methods_by_obf: HashMap::new(),
            member_count: 0,
        };

        let mut current_obf_class: Option<String> = None;
        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((header, rest)) = split_class_header(line) {
                let (orig, obf) = header;
                mapping.class_by_obf.insert(obf.clone(), orig.clone());
                mapping.class_by_orig.insert(orig, obf.clone());
                current_obf_class = Some(obf);
                // Compact one-line form: members can follow the colon.
                if let (Some(class), Some(rest)) = (current_obf_class.as_deref(), rest) {
                    let class = class.to_string();
                    mapping.parse_member(&class, rest);
                }
                continue;
            }

            if let Some(class) = current_obf_class.clone() {
                mapping.parse_member(&class, line);
            }
        }

        mapping
    }

    fn parse_member(&mut self, obf_class: &str, line: &str) {
        let Some((lhs, obf_name)) = line.rsplit_once(" -> ") else {
            return;
        };
        let obf_name = obf_name.trim();
        // Strip the `startLine:endLine:` prefix R8 writes in front of methods.
        let lhs = strip_line_prefix(lhs.trim());

        let Some((_type_name, member)) = lhs.split_once(' ') else {
            return;
        };
        let member = member.trim();

        if let Some((method_name, args)) = member.split_once('(') {
            let args = args.trim_end_matches(')');
            let arity = if args.trim().is_empty() {
                0
            } else {
                args.split(',').count()
            };
            self.methods_by_obf
                .entry((obf_class.to_string(), obf_name.to_string()))
                .or_default()
                .push((arity, method_name.trim().to_string()));
            self.member_count += 1;
        } else {
            self.fields_by_obf.insert(
                (obf_class.to_string(), obf_name.to_string()),
                member.to_string(),
            );
            self.fields_by_orig.insert(
                (obf_class.to_string(), member.to_string()),
                obf_name.to_string(),
            );
            self.member_count += 1;
        }
    }

    pub fn class_count(&self) -> usize {
        self.class_by_obf.len()
    }

    pub fn member_count(&self) -> usize {
        self.member_count
    }

    pub fn deobfuscate_class(&self, raw: &str) -> Option<&str> {
        self.class_by_obf.get(raw).map(String::as_str)
    }

    pub fn obfuscate_class(&self, original: &str) -> Option<&str> {
        self.class_by_orig.get(original).map(String::as_str)
    }

    /// Resolve a method name, preferring an exact arity match and falling back
    /// to any overload when the arity is unknown or unmatched.
    pub fn deobfuscate_method(
        &self,
        raw_class: &str,
        raw_method: &str,
        arity: Option<usize>,
    ) -> Option<&str> {
        let overloads = self
            .methods_by_obf
            .get(&(raw_class.to_string(), raw_method.to_string()))?;
        if let Some(arity) = arity {
            if let Some((_, name)) = overloads.iter().find(|(a, _)| *a == arity) {
                return Some(name.as_str());
            }
        }
        overloads.first().map(|(_, name)| name.as_str())
    }

    pub fn deobfuscate_field(&self, raw_class: &str, raw_field: &str) -> Option<&str> {
        self.fields_by_obf
            .get(&(raw_class.to_string(), raw_field.to_string()))
            .map(String::as_str)
    }

    /// Reverse field lookup: the obfuscated name behind an original name, so
    /// `inspect helper.profileId` can read the field stored as `seed`.
    pub fn obfuscate_field(&self, raw_class: &str, original_field: &str) -> Option<&str> {
        self.fields_by_orig
            .get(&(raw_class.to_string(), original_field.to_string()))
            .map(String::as_str)
    }

    /// Deobfuscate a type name, preserving any `[]` array suffixes.
    pub fn deobfuscate_type_name(&self, raw: &str) -> String {
        let mut base = raw;
        let mut dims = 0usize;
        while let Some(stripped) = base.strip_suffix("[]") {
            base = stripped;
            dims += 1;
        }
        let mut out = self
            .deobfuscate_class(base)
            .unwrap_or(base)
            .to_string();
        for _ in 0..dims {
            out.push_str("[]");
        }
        out
    }
}

fn split_class_header(line: &str) -> Option<((String, String), Option<&str>)> {
    let (lhs, rhs) = line.split_once(" -> ")?;
    let colon = rhs.find(':')?;
    let obf = rhs[..colon].trim();
    let orig = lhs.trim();
    // Class names never contain spaces or parens; anything else is a member line.
    if orig.is_empty() || obf.is_empty() || orig.contains(' ') || orig.contains('(') {
        return None;
    }
    let rest = rhs[colon + 1..].trim();
    let rest = if rest.is_empty() { None } else { Some(rest) };
    Some(((orig.to_string(), obf.to_string()), rest))
}

fn strip_line_prefix(lhs: &str) -> &str {
    // `1:5:void doWork(int) -> c`: drop the numeric range.
    let mut rest = lhs;
    for _ in 0..2 {
        if let Some((head, tail)) = rest.split_once(':') {
            if head.chars().all(|c| c.is_ascii_digit()) && !head.is_empty() {
                rest = tail;
                continue;
            }
        }
        break;
    }
    rest
}
