//! XML rendering of LUN and port lists.
//!
//! Element and attribute names, 8-space indentation and entity forms match
//! what existing `ctladm -x` consumers parse. The output has no XML
//! declaration.

use std::fmt::Write;

use super::records::{Lun, Port};

// ============================================================================
// ToXml trait
// ============================================================================

/// Trait for records that render as an XML element.
pub trait ToXml {
    /// Serialize to XML with the given nesting level.
    fn to_xml(&self, level: usize) -> String;
}

fn indent(level: usize) -> String {
    " ".repeat(8 * level)
}

/// Escape character data and attribute values.
///
/// Characters XML 1.0 cannot carry become U+FFFD.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            '\u{0}'..='\u{1f}' | '\u{fffe}' | '\u{ffff}' => out.push('\u{fffd}'),
            _ => out.push(c),
        }
    }
    out
}

/// `<name>text</name>` on its own line.
fn text_element(s: &mut String, level: usize, name: &str, text: &str) {
    writeln!(s, "{}<{}>{}</{}>", indent(level), name, escape(text), name).unwrap();
}

// ============================================================================
// Records
// ============================================================================

impl ToXml for Lun {
    fn to_xml(&self, level: usize) -> String {
        let mut s = String::new();
        let ind = indent(level);
        writeln!(s, "{}<lun id=\"{}\">", ind, escape(&self.id)).unwrap();
        text_element(&mut s, level + 1, "backend_type", &self.backend_type);
        text_element(&mut s, level + 1, "lun_type", "0");
        text_element(&mut s, level + 1, "size", &self.size);
        text_element(&mut s, level + 1, "blocksize", &self.block_size);
        text_element(&mut s, level + 1, "serial_number", &self.serial_number);
        text_element(&mut s, level + 1, "device_id", &self.device_name);
        text_element(&mut s, level + 1, "num_threads", &self.num_threads);
        text_element(&mut s, level + 1, "file", &self.filename);
        text_element(&mut s, level + 1, "ctld_name", &self.ctld_name());
        writeln!(s, "{}</lun>", ind).unwrap();
        s
    }
}

impl ToXml for Port {
    fn to_xml(&self, level: usize) -> String {
        let mut s = String::new();
        let ind = indent(level);
        let inner = indent(level + 1);
        writeln!(s, "{}<targ_port id=\"{}\">", ind, escape(&self.id)).unwrap();
        writeln!(s, "{}<lun id=\"0\">{}</lun>", inner, escape(&self.id)).unwrap();
        text_element(&mut s, level + 1, "target", &self.wwn);
        text_element(
            &mut s,
            level + 1,
            "initiator",
            self.initiator.as_deref().unwrap_or(""),
        );
        writeln!(s, "{}</targ_port>", ind).unwrap();
        s
    }
}

// ============================================================================
// Lists
// ============================================================================

/// Wrap rendered records in a root element. No trailing newline.
fn list<T: ToXml>(root: &str, records: &[T]) -> String {
    if records.is_empty() {
        return format!("<{}></{}>", root, root);
    }

    let mut s = String::new();
    writeln!(s, "<{}>", root).unwrap();
    for record in records {
        s.push_str(&record.to_xml(1));
    }
    write!(s, "</{}>", root).unwrap();
    s
}

/// `ctladm devlist -x` document.
pub fn lun_list(luns: &[Lun]) -> String {
    list("ctllunlist", luns)
}

/// `ctladm portlist -x` document.
pub fn port_list(ports: &[Port]) -> String {
    list("ctlportlist", ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctl::records::tests::{sample_lun, sample_port};

    #[test]
    fn test_lun_list_layout() {
        let xml = lun_list(&[sample_lun()]);
        println!("=== XML OUTPUT ===\n{}\n==================", xml);

        let expected = "<ctllunlist>
        <lun id=\"1\">
                <backend_type>block</backend_type>
                <lun_type>0</lun_type>
                <size>10737418240</size>
                <blocksize>512</blocksize>
                <serial_number>3b0a1c7e</serial_number>
                <device_id>disk1</device_id>
                <num_threads>8</num_threads>
                <file>/dev/zvol/tank/disk1</file>
                <ctld_name>iqn.2024-01.com.example:1,lun,0</ctld_name>
        </lun>
</ctllunlist>";
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_port_list_layout() {
        let xml = port_list(&[sample_port()]);
        let expected = "<ctlportlist>
        <targ_port id=\"1\">
                <lun id=\"0\">1</lun>
                <target>iqn.2024-01.com.example:1</target>
                <initiator>iqn.1991-05.com.microsoft:host1</initiator>
        </targ_port>
</ctlportlist>";
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_port_without_initiator() {
        let mut port = sample_port();
        port.initiator = None;
        assert!(port.to_xml(0).contains("<initiator></initiator>"));
    }

    #[test]
    fn test_empty_lists() {
        assert_eq!(lun_list(&[]), "<ctllunlist></ctllunlist>");
        assert_eq!(port_list(&[]), "<ctlportlist></ctlportlist>");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a&b"), "a&amp;b");
        assert_eq!(escape("<x>"), "&lt;x&gt;");
        assert_eq!(escape("\"q\" 'a'"), "&#34;q&#34; &#39;a&#39;");
        assert_eq!(escape("a\tb\nc\r"), "a&#x9;b&#xA;c&#xD;");
    }

    #[test]
    fn test_escape_replaces_invalid_characters() {
        assert_eq!(escape("a\u{0}b\u{1b}c"), "a\u{fffd}b\u{fffd}c");
        assert_eq!(escape("x\u{ffff}"), "x\u{fffd}");
        assert_eq!(escape("del\u{7f}"), "del\u{7f}");
    }

    #[test]
    fn test_lun_escapes_values() {
        let mut lun = sample_lun();
        lun.filename = "/srv/a&b.img".to_string();
        assert!(lun.to_xml(0).contains("<file>/srv/a&amp;b.img</file>"));
    }
}
