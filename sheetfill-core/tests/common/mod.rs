#![allow(dead_code)]

use sheetfill_core::Package;
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

pub const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellStyleXfs count="1"><xf/></cellStyleXfs><cellXfs count="2"><xf/><xf fontId="0" applyFont="1"/></cellXfs></styleSheet>"#;

/// Builder for minimal but complete spreadsheet packages
pub struct MockXlsx {
    sheets: Vec<(String, String)>,
    shared_strings: Option<Vec<String>>,
    root_rels: bool,
}

impl MockXlsx {
    pub fn new() -> Self {
        Self {
            sheets: Vec::new(),
            shared_strings: None,
            root_rels: true,
        }
    }

    /// Add a sheet whose `sheetData` holds `rows`
    pub fn sheet(self, name: &str, rows: &str) -> Self {
        let xml = worksheet_xml(rows);
        self.raw_sheet(name, &xml)
    }

    /// Add a sheet with complete worksheet XML
    pub fn raw_sheet(mut self, name: &str, xml: &str) -> Self {
        self.sheets.push((name.to_string(), xml.to_string()));
        self
    }

    pub fn shared_strings(mut self, strings: &[&str]) -> Self {
        self.shared_strings = Some(strings.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Leave out `_rels/.rels`
    pub fn without_root_rels(mut self) -> Self {
        self.root_rels = false;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.try_build().expect("mock package")
    }

    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.try_build()?)?;
        Ok(())
    }

    fn try_build(&self) -> anyhow::Result<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);
        let deflated = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o600);

        // 1. [Content_Types].xml
        zip.start_file("[Content_Types].xml", stored)?;
        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#,
        );
        for (i, _) in self.sheets.iter().enumerate() {
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                i + 1
            ));
        }
        if self.shared_strings.is_some() {
            content_types.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
        }
        content_types.push_str("</Types>");
        zip.write_all(content_types.as_bytes())?;

        // 2. _rels/.rels
        if self.root_rels {
            zip.start_file("_rels/.rels", stored)?;
            zip.write_all(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.as_bytes())?;
        }

        // 3. xl/workbook.xml
        zip.start_file("xl/workbook.xml", deflated)?;
        let mut workbook_xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="{}" xmlns:r="{}"><sheets>"#,
            MAIN_NS, REL_NS
        );
        for (i, (name, _)) in self.sheets.iter().enumerate() {
            workbook_xml.push_str(&format!(
                r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                name,
                i + 1,
                i + 1
            ));
        }
        workbook_xml.push_str("</sheets></workbook>");
        zip.write_all(workbook_xml.as_bytes())?;

        // 4. xl/_rels/workbook.xml.rels
        zip.start_file("xl/_rels/workbook.xml.rels", deflated)?;
        let mut rels_xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (i, _) in self.sheets.iter().enumerate() {
            rels_xml.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i + 1,
                REL_NS,
                i + 1
            ));
        }
        let next = self.sheets.len() + 1;
        rels_xml.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="{}/styles" Target="styles.xml"/>"#,
            next, REL_NS
        ));
        if self.shared_strings.is_some() {
            rels_xml.push_str(&format!(
                r#"<Relationship Id="rId{}" Type="{}/sharedStrings" Target="sharedStrings.xml"/>"#,
                next + 1,
                REL_NS
            ));
        }
        rels_xml.push_str("</Relationships>");
        zip.write_all(rels_xml.as_bytes())?;

        // 5. styles
        zip.start_file("xl/styles.xml", deflated)?;
        zip.write_all(STYLES_XML.as_bytes())?;

        // 6. sheets
        for (i, (_, xml)) in self.sheets.iter().enumerate() {
            zip.start_file(format!("xl/worksheets/sheet{}.xml", i + 1), deflated)?;
            zip.write_all(xml.as_bytes())?;
        }

        // 7. shared strings
        if let Some(strings) = &self.shared_strings {
            zip.start_file("xl/sharedStrings.xml", deflated)?;
            zip.write_all(shared_strings_xml(strings).as_bytes())?;
        }

        Ok(zip.finish()?.into_inner())
    }
}

pub fn worksheet_xml(rows: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="{}" xmlns:r="{}"><dimension ref="A1:C1"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><cols><col min="1" max="3" width="18" customWidth="1"/></cols><sheetData>{}</sheetData><mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#,
        MAIN_NS, REL_NS, rows
    )
}

pub fn shared_strings_xml(strings: &[String]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="{}" count="{}" uniqueCount="{}">"#,
        MAIN_NS,
        strings.len(),
        strings.len()
    );
    for s in strings {
        xml.push_str(&format!("<si><t>{}</t></si>", s));
    }
    xml.push_str("</sst>");
    xml
}

/// Decompressed text of one part
pub fn read_part(bytes: &[u8], path: &str) -> String {
    let mut package = Package::open(bytes.to_vec()).expect("valid package");
    String::from_utf8(package.read_part(path).expect("part present")).expect("utf-8 part")
}

/// Raw (still compressed) entry data keyed by part name
pub fn raw_entries(bytes: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("zip");
    let mut entries = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index_raw(i).expect("entry");
        let mut data = Vec::new();
        file.read_to_end(&mut data).expect("read entry");
        entries.insert(file.name().to_string(), data);
    }
    entries
}

pub fn part_names(bytes: &[u8]) -> Vec<String> {
    let package = Package::open(bytes.to_vec()).expect("valid package");
    package.parts().iter().map(|p| p.name.clone()).collect()
}
