//! CycloneDX XML bill of materials for policy submission.
//!
//! Uses the 1.1 schema with the 1.0 vulnerability extension, which is what
//! policy servers of this kind ingest. See: https://cyclonedx.org/

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

use crate::error::{AuditError, AuditResult};
use crate::model::{Coordinate, CoordinateReport, Vulnerability};

const BOM_NS: &str = "http://cyclonedx.org/schema/bom/1.1";
const VULN_NS: &str = "http://cyclonedx.org/schema/ext/vulnerability/1.0";

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Builds the document listing every audited component and its
/// non-excluded vulnerabilities.
pub fn build_bom(reports: &[CoordinateReport]) -> AuditResult<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let serial = format!("urn:uuid:{}", uuid::Uuid::new_v4());
    let bom = BytesStart::new("bom").with_attributes([
        ("xmlns", BOM_NS),
        ("xmlns:v", VULN_NS),
        ("version", "1"),
        ("serialNumber", serial.as_str()),
    ]);
    emit(&mut writer, Event::Start(bom))?;
    emit(&mut writer, Event::Start(BytesStart::new("components")))?;

    for report in reports {
        write_component(&mut writer, report)?;
    }

    emit(&mut writer, Event::End(BytesEnd::new("components")))?;
    emit(&mut writer, Event::End(BytesEnd::new("bom")))?;

    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| AuditError::Bom(e.to_string()))
}

fn write_component(writer: &mut XmlWriter, report: &CoordinateReport) -> AuditResult<()> {
    let coordinate = Coordinate::from_raw(report.coordinates.as_str());
    let component = BytesStart::new("component").with_attributes([
        ("type", "library"),
        ("bom-ref", report.coordinates.as_str()),
    ]);
    emit(writer, Event::Start(component))?;

    text_element(writer, "name", coordinate.name())?;
    text_element(writer, "version", coordinate.version())?;
    text_element(writer, "purl", &report.coordinates)?;

    if report.is_vulnerable() {
        emit(writer, Event::Start(BytesStart::new("v:vulnerabilities")))?;
        for vuln in report.active_vulnerabilities() {
            write_vulnerability(writer, &report.coordinates, vuln)?;
        }
        emit(writer, Event::End(BytesEnd::new("v:vulnerabilities")))?;
    }

    emit(writer, Event::End(BytesEnd::new("component")))
}

fn write_vulnerability(writer: &mut XmlWriter, component_ref: &str, vuln: &Vulnerability) -> AuditResult<()> {
    let start = BytesStart::new("v:vulnerability").with_attributes([("ref", component_ref)]);
    emit(writer, Event::Start(start))?;

    text_element(writer, "v:id", vuln.cve.as_deref().unwrap_or(&vuln.id))?;

    emit(
        writer,
        Event::Start(BytesStart::new("v:source").with_attributes([("name", "component-report")])),
    )?;
    text_element(writer, "v:url", &vuln.reference)?;
    emit(writer, Event::End(BytesEnd::new("v:source")))?;

    emit(writer, Event::Start(BytesStart::new("v:ratings")))?;
    emit(writer, Event::Start(BytesStart::new("v:rating")))?;
    emit(writer, Event::Start(BytesStart::new("v:score")))?;
    text_element(writer, "v:base", &format!("{:.1}", vuln.cvss_score))?;
    emit(writer, Event::End(BytesEnd::new("v:score")))?;
    text_element(writer, "v:severity", severity_label(vuln))?;
    text_element(writer, "v:method", "CVSSv3")?;
    if !vuln.cvss_vector.is_empty() {
        text_element(writer, "v:vector", &vuln.cvss_vector)?;
    }
    emit(writer, Event::End(BytesEnd::new("v:rating")))?;
    emit(writer, Event::End(BytesEnd::new("v:ratings")))?;

    if !vuln.description.is_empty() {
        text_element(writer, "v:description", &vuln.description)?;
    }

    emit(writer, Event::End(BytesEnd::new("v:vulnerability")))
}

fn severity_label(vuln: &Vulnerability) -> &'static str {
    use crate::model::Severity;

    match vuln.severity() {
        Severity::Critical => "Critical",
        Severity::High => "High",
        Severity::Medium => "Medium",
        Severity::Low => "Low",
        Severity::None => "None",
    }
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> AuditResult<()> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> AuditResult<()> {
    writer
        .write_event(event)
        .map_err(|e| AuditError::Bom(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::testing::vulnerability;

    #[test]
    fn test_components_and_vulnerabilities() {
        let clean = CoordinateReport::clean("pkg:golang/example.com/b@0.1.0");
        let mut vulnerable = CoordinateReport::clean("pkg:golang/example.com/a@1.0.0");
        vulnerable.vulnerabilities.push(vulnerability("CVE-2024-1", 9.8));
        let mut ignored = vulnerability("CVE-2024-2", 4.0);
        ignored.excluded = true;
        vulnerable.vulnerabilities.push(ignored);

        let xml = build_bom(&[vulnerable, clean]).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("serialNumber=\"urn:uuid:"));
        assert_eq!(xml.matches("<component ").count(), 2);
        assert!(xml.contains("<name>example.com/a</name>"));
        assert!(xml.contains("<version>0.1.0</version>"));
        assert!(xml.contains("<v:id>CVE-2024-1</v:id>"));
        assert!(xml.contains("<v:severity>Critical</v:severity>"));
        assert!(!xml.contains("CVE-2024-2"));
        assert_eq!(xml.matches("<v:vulnerabilities>").count(), 1);
    }

    #[test]
    fn test_text_is_escaped() {
        let mut report = CoordinateReport::clean("pkg:golang/a@1.0.0");
        let mut vuln = vulnerability("CVE-2024-3", 5.0);
        vuln.description = "<script> & friends".to_string();
        report.vulnerabilities.push(vuln);

        let xml = build_bom(&[report]).unwrap();
        assert!(xml.contains("&lt;script&gt; &amp; friends"));
    }
}
