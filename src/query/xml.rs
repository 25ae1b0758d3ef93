use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;

use crate::core::error::{Error, ErrorKind, Result};
use crate::query::searchdata::{
    ClauseKind, CompositeKind, DateBound, DateRange, Modifiers, Relation, SearchClause,
    SearchData, SubdocSpec,
};

// XML storage of a search, used by callers to persist query history. Field
// names and free text go base64-encoded, so no escaping is ever needed.

fn b64e(s: &str) -> String {
    B64.encode(s.as_bytes())
}

fn b64d(s: &str) -> Result<String> {
    let bytes = B64
        .decode(s.trim())
        .map_err(|e| Error::new(ErrorKind::Parse, format!("bad base64: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::new(ErrorKind::Parse, e.to_string()))
}

fn kind_code(kind: ClauseKind) -> &'static str {
    match kind {
        ClauseKind::And => "AND",
        ClauseKind::Or => "OR",
        ClauseKind::Filename => "FN",
        ClauseKind::Phrase => "PH",
        ClauseKind::Near => "NE",
        ClauseKind::Path => "PA",
        ClauseKind::Range => "RG",
        ClauseKind::Sub => "SUB",
    }
}

fn kind_from_code(code: &str) -> Result<ClauseKind> {
    Ok(match code {
        "AND" => ClauseKind::And,
        "OR" => ClauseKind::Or,
        "FN" => ClauseKind::Filename,
        "PH" => ClauseKind::Phrase,
        "NE" => ClauseKind::Near,
        "PA" => ClauseKind::Path,
        "RG" => ClauseKind::Range,
        "SUB" => ClauseKind::Sub,
        other => {
            return Err(Error::new(ErrorKind::Parse, format!("unknown clause type {}", other)));
        }
    })
}

fn rel_code(rel: Relation) -> &'static str {
    match rel {
        Relation::Contains => "CT",
        Relation::Equals => "EQ",
        Relation::Lt => "LT",
        Relation::Lte => "LE",
        Relation::Gt => "GT",
        Relation::Gte => "GE",
    }
}

fn rel_from_code(code: &str) -> Result<Relation> {
    Ok(match code {
        "CT" => Relation::Contains,
        "EQ" => Relation::Equals,
        "LT" => Relation::Lt,
        "LE" => Relation::Lte,
        "GT" => Relation::Gt,
        "GE" => Relation::Gte,
        other => return Err(Error::new(ErrorKind::Parse, format!("unknown relation {}", other))),
    })
}

fn push_date(out: &mut String, tag: &str, bound: &DateBound) {
    out.push_str(&format!(
        "<{tag}><D>{}</D><M>{}</M><Y>{}</Y></{tag}>\n",
        bound.day, bound.month, bound.year
    ));
}

pub fn to_xml(sd: &SearchData) -> String {
    let mut out = String::new();
    write_sd(sd, &mut out);
    out
}

fn write_sd(sd: &SearchData, out: &mut String) {
    out.push_str("<SD>\n<CL>\n");
    if sd.kind == CompositeKind::Or {
        out.push_str("<CLT>OR</CLT>\n");
    }
    for c in &sd.clauses {
        out.push_str("<C>\n");
        if c.exclude {
            out.push_str("<NEG/>\n");
        }
        out.push_str(&format!("<CT>{}</CT>\n", kind_code(c.kind)));
        if !c.field.is_empty() {
            out.push_str(&format!("<F>{}</F>\n", b64e(&c.field)));
        }
        if !c.text.is_empty() {
            out.push_str(&format!("<T>{}</T>\n", b64e(&c.text)));
        }
        if !c.text2.is_empty() {
            out.push_str(&format!("<T2>{}</T2>\n", b64e(&c.text2)));
        }
        if c.slack != 0 {
            out.push_str(&format!("<S>{}</S>\n", c.slack));
        }
        if c.weight != 1.0 {
            out.push_str(&format!("<W>{}</W>\n", c.weight));
        }
        if !c.modifiers.is_empty() {
            out.push_str(&format!("<MODS>{}</MODS>\n", c.modifiers.bits()));
        }
        if c.rel != Relation::Contains {
            out.push_str(&format!("<RL>{}</RL>\n", rel_code(c.rel)));
        }
        if let Some(sub) = &c.sub {
            write_sd(sub, out);
        }
        out.push_str("</C>\n");
    }
    out.push_str("</CL>\n");

    if let Some(dates) = &sd.dates {
        if dates.min.is_set() {
            push_date(out, "DMI", &dates.min);
        }
        if dates.max.is_set() {
            push_date(out, "DMA", &dates.max);
        }
    }
    if let Some(dates) = &sd.birth_dates {
        if dates.min.is_set() {
            push_date(out, "BMI", &dates.min);
        }
        if dates.max.is_set() {
            push_date(out, "BMA", &dates.max);
        }
    }
    if sd.min_size >= 0 {
        out.push_str(&format!("<MIS>{}</MIS>\n", sd.min_size));
    }
    if sd.max_size >= 0 {
        out.push_str(&format!("<MAS>{}</MAS>\n", sd.max_size));
    }
    if !sd.filetypes.is_empty() {
        out.push_str(&format!("<ST>{}</ST>\n", sd.filetypes.join(" ")));
    }
    if !sd.nfiletypes.is_empty() {
        out.push_str(&format!("<IT>{}</IT>\n", sd.nfiletypes.join(" ")));
    }
    match sd.subspec {
        SubdocSpec::Any => {}
        SubdocSpec::TopOnly => out.push_str("<SUBDOCS>0</SUBDOCS>\n"),
        SubdocSpec::SubOnly => out.push_str("<SUBDOCS>1</SUBDOCS>\n"),
    }
    for ex in &sd.extindexes {
        out.push_str(&format!("<EX>{}</EX>\n", b64e(ex)));
    }
    out.push_str("</SD>\n");
}

pub fn from_xml(xml: &str) -> Result<SearchData> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| Error::new(ErrorKind::Parse, format!("search xml: {}", e)))?;
    let root = doc.root_element();
    if root.tag_name().name() != "SD" {
        return Err(Error::new(ErrorKind::Parse, "expected SD root"));
    }
    read_sd(root)
}

fn read_sd(node: roxmltree::Node) -> Result<SearchData> {
    let mut sd = SearchData::new(CompositeKind::And);
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "CL" => read_clause_list(child, &mut sd)?,
            "DMI" => {
                let mut d = sd.dates.unwrap_or_default();
                d.min = read_date(child)?;
                sd.dates = Some(d);
            }
            "DMA" => {
                let mut d = sd.dates.unwrap_or_default();
                d.max = read_date(child)?;
                sd.dates = Some(d);
            }
            "BMI" => {
                let mut d = sd.birth_dates.unwrap_or_default();
                d.min = read_date(child)?;
                sd.birth_dates = Some(d);
            }
            "BMA" => {
                let mut d = sd.birth_dates.unwrap_or_default();
                d.max = read_date(child)?;
                sd.birth_dates = Some(d);
            }
            "MIS" => sd.min_size = text_of(child).trim().parse().unwrap_or(-1),
            "MAS" => sd.max_size = text_of(child).trim().parse().unwrap_or(-1),
            "ST" => {
                sd.filetypes =
                    text_of(child).split_whitespace().map(|s| s.to_string()).collect();
            }
            "IT" => {
                sd.nfiletypes =
                    text_of(child).split_whitespace().map(|s| s.to_string()).collect();
            }
            "SUBDOCS" => {
                sd.subspec = if text_of(child).trim() == "1" {
                    SubdocSpec::SubOnly
                } else {
                    SubdocSpec::TopOnly
                };
            }
            "EX" => sd.extindexes.push(b64d(&text_of(child))?),
            _ => {}
        }
    }
    Ok(sd)
}

fn read_clause_list(node: roxmltree::Node, sd: &mut SearchData) -> Result<()> {
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "CLT" => {
                if text_of(child).trim() == "OR" {
                    sd.kind = CompositeKind::Or;
                }
            }
            "C" => sd.clauses.push(read_clause(child)?),
            _ => {}
        }
    }
    Ok(())
}

fn read_clause(node: roxmltree::Node) -> Result<SearchClause> {
    let mut c = SearchClause::simple(ClauseKind::And, "", "");
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "NEG" => c.exclude = true,
            "CT" => c.kind = kind_from_code(text_of(child).trim())?,
            "F" => c.field = b64d(&text_of(child))?,
            "T" => c.text = b64d(&text_of(child))?,
            "T2" => c.text2 = b64d(&text_of(child))?,
            "S" => c.slack = text_of(child).trim().parse().unwrap_or(0),
            "W" => c.weight = text_of(child).trim().parse().unwrap_or(1.0),
            "MODS" => {
                let bits: u32 = text_of(child).trim().parse().unwrap_or(0);
                c.modifiers = Modifiers::from_bits_truncate(bits);
            }
            "RL" => c.rel = rel_from_code(text_of(child).trim())?,
            "SD" => c.sub = Some(Box::new(read_sd(child)?)),
            _ => {}
        }
    }
    Ok(c)
}

fn read_date(node: roxmltree::Node) -> Result<DateBound> {
    let mut b = DateBound::default();
    for child in node.children().filter(|n| n.is_element()) {
        let v = text_of(child);
        match child.tag_name().name() {
            "D" => b.day = v.trim().parse().unwrap_or(0),
            "M" => b.month = v.trim().parse().unwrap_or(0),
            "Y" => b.year = v.trim().parse().unwrap_or(0),
            _ => {}
        }
    }
    Ok(b)
}

fn text_of(node: roxmltree::Node) -> String {
    node.text().unwrap_or("").to_string()
}
