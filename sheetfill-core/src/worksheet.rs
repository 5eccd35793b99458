//! Structural worksheet tree: locate-or-create rows and cells inside `sheetData`
//!
//! Markup before and after `sheetData` is kept as raw bytes. Inside it,
//! rows and cells live in ordered maps so ascending order is a property of
//! the structure rather than of insertion code. Untouched rows and cells
//! keep their original start tags and children and are re-emitted as read.

use crate::cell_ref::{CellRef, MAX_ROW, col_to_letters, split_stored_ref};
use crate::error::{PatchError, Result};
use crate::shared_strings::SharedStringTable;
use crate::value::{CellUpdate, CellValue};
use crate::xml::{is_forbidden_char, local_name, prefix_of, text_event};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;

/// What happened to a single update
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Applied,
    /// The cell holds a formula; it was left exactly as it was
    SkippedFormula,
}

/// Read-only view of one cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellView {
    pub reference: CellRef,
    /// Value of the `t` attribute
    pub cell_type: Option<String>,
    pub formula: Option<String>,
    /// Text of `<v>`
    pub value: Option<String>,
    /// Text of an inline `<is>` string
    pub inline_text: Option<String>,
}

#[derive(Debug, Clone)]
struct CellChild {
    local: Vec<u8>,
    events: Vec<Event<'static>>,
}

#[derive(Debug, Clone)]
struct Cell {
    start: BytesStart<'static>,
    children: Vec<CellChild>,
}

#[derive(Debug, Clone)]
struct Row {
    start: BytesStart<'static>,
    cells: BTreeMap<u32, Cell>,
    /// Non-cell children such as `extLst`, emitted after the cells
    extra: Vec<Event<'static>>,
    /// Non-row siblings (comments, processing instructions) that followed
    /// this row up to the next one
    follow: Vec<Event<'static>>,
}

/// One worksheet part, split around its `sheetData` element
#[derive(Debug, Clone)]
pub struct WorksheetTree {
    part: String,
    head: Vec<u8>,
    sheet_data: BytesStart<'static>,
    rows: BTreeMap<u32, Row>,
    /// Non-row nodes ahead of the first row
    leading: Vec<Event<'static>>,
    tail: Vec<u8>,
    prefix: String,
}

/// Result of patching one worksheet part
#[derive(Debug, Clone)]
pub struct PatchedWorksheet {
    pub xml: Vec<u8>,
    pub statuses: Vec<UpdateStatus>,
}

fn malformed(part: &str, detail: impl fmt::Display) -> PatchError {
    PatchError::MalformedWorksheet(part.to_string(), detail.to_string())
}

fn is_blank(text: &BytesText) -> bool {
    text.iter().all(|b| b.is_ascii_whitespace())
}

/// Drop a leading BOM and XML declaration along with the whitespace after it
fn strip_declaration(head: &[u8]) -> &[u8] {
    let head = head.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(head);
    if !head.starts_with(b"<?xml") {
        return head;
    }
    match head.windows(2).position(|w| w == b"?>") {
        Some(end) => {
            let rest = &head[end + 2..];
            let skip = rest.iter().take_while(|b| b.is_ascii_whitespace()).count();
            &rest[skip..]
        }
        None => head,
    }
}

/// Copy events up to and including the end tag that closes an already consumed start tag
fn collect_subtree(
    reader: &mut Reader<&[u8]>,
    part: &str,
    out: &mut Vec<Event<'static>>,
) -> Result<()> {
    let mut depth = 0usize;
    loop {
        let event = reader.read_event().map_err(|e| malformed(part, e))?;
        let closes = match &event {
            Event::Start(_) => {
                depth += 1;
                false
            }
            Event::End(_) if depth == 0 => true,
            Event::End(_) => {
                depth -= 1;
                false
            }
            Event::Eof => return Err(malformed(part, "unexpected end of document")),
            _ => false,
        };
        out.push(event.into_owned());
        if closes {
            return Ok(());
        }
    }
}

/// Copy of `start` with attribute `key` set to `value`, or removed when `value` is `None`.
///
/// Other attributes are carried over byte for byte. An existing attribute
/// keeps its position.
fn set_attribute(
    start: &BytesStart,
    key: &str,
    value: Option<&str>,
    part: &str,
) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut rebuilt = BytesStart::new(name);
    let mut replaced = false;
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(part, e))?;
        if attr.key.as_ref() == key.as_bytes() {
            if let Some(value) = value {
                rebuilt.push_attribute((key, value));
                replaced = true;
            }
            continue;
        }
        rebuilt.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    if let (false, Some(value)) = (replaced, value) {
        rebuilt.push_attribute((key, value));
    }
    Ok(rebuilt)
}

fn raw_attribute(start: &BytesStart, key: &[u8], part: &str) -> Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| malformed(part, e))?;
        if attr.key.as_ref() == key {
            return Ok(Some(String::from_utf8_lossy(&attr.value).into_owned()));
        }
    }
    Ok(None)
}

impl Cell {
    fn new(prefix: &str, reference: &CellRef) -> Self {
        let mut start = BytesStart::new(format!("{}c", prefix));
        start.push_attribute(("r", reference.to_string().as_str()));
        Self {
            start,
            children: Vec::new(),
        }
    }

    fn has_child(&self, local: &[u8]) -> bool {
        self.children.iter().any(|c| c.local == local)
    }

    /// Concatenated text of the first child named `local`, ignoring phonetic runs
    fn child_text(&self, local: &[u8], part: &str) -> Result<Option<String>> {
        let Some(child) = self.children.iter().find(|c| c.local == local) else {
            return Ok(None);
        };
        let mut text = String::new();
        let mut phonetic = 0usize;
        for event in &child.events {
            match event {
                Event::Start(e) if e.local_name().as_ref() == b"rPh" => phonetic += 1,
                Event::End(e) if e.local_name().as_ref() == b"rPh" => {
                    phonetic = phonetic.saturating_sub(1)
                }
                Event::Text(t) if phonetic == 0 => {
                    text.push_str(&t.unescape().map_err(|e| malformed(part, e))?)
                }
                Event::CData(c) if phonetic == 0 => text.push_str(&String::from_utf8_lossy(c)),
                _ => {}
            }
        }
        Ok(Some(text))
    }

    /// Insert a fresh `<v>` child ahead of any `extLst`
    fn insert_value(&mut self, prefix: &str, text: &str) {
        let name = format!("{}v", prefix);
        let events = vec![
            Event::Start(BytesStart::new(name.clone())),
            Event::Text(text_event(text)),
            Event::End(BytesEnd::new(name)),
        ];
        let at = self
            .children
            .iter()
            .position(|c| c.local == b"extLst")
            .unwrap_or(self.children.len());
        self.children.insert(
            at,
            CellChild {
                local: b"v".to_vec(),
                events,
            },
        );
    }

    fn view(&self, reference: CellRef, part: &str) -> Result<CellView> {
        Ok(CellView {
            reference,
            cell_type: raw_attribute(&self.start, b"t", part)?,
            formula: self.child_text(b"f", part)?,
            value: self.child_text(b"v", part)?,
            inline_text: self.child_text(b"is", part)?,
        })
    }

    fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        if self.children.is_empty() {
            writer.write_event(Event::Empty(self.start.borrow()))?;
            return Ok(());
        }
        writer.write_event(Event::Start(self.start.borrow()))?;
        for child in &self.children {
            for event in &child.events {
                writer.write_event(event.borrow())?;
            }
        }
        writer.write_event(Event::End(self.start.to_end()))?;
        Ok(())
    }
}

impl Row {
    fn new(prefix: &str, number: u32) -> Self {
        let mut start = BytesStart::new(format!("{}row", prefix));
        start.push_attribute(("r", number.to_string().as_str()));
        Self {
            start,
            cells: BTreeMap::new(),
            extra: Vec::new(),
            follow: Vec::new(),
        }
    }

    /// Widen a `spans="min:max"` hint so it covers `col`
    fn widen_spans(&mut self, col: u32, part: &str) -> Result<()> {
        let Some(spans) = raw_attribute(&self.start, b"spans", part)? else {
            return Ok(());
        };
        let Some((min, max)) = spans
            .split_once(':')
            .and_then(|(a, b)| Some((a.trim().parse::<u32>().ok()?, b.trim().parse::<u32>().ok()?)))
        else {
            return Ok(());
        };
        if col < min || col > max {
            let widened = format!("{}:{}", min.min(col), max.max(col));
            self.start = set_attribute(&self.start, "spans", Some(widened.as_str()), part)?;
        }
        Ok(())
    }

    fn write_element<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        if self.cells.is_empty() && self.extra.is_empty() {
            writer.write_event(Event::Empty(self.start.borrow()))?;
            return Ok(());
        }
        writer.write_event(Event::Start(self.start.borrow()))?;
        for cell in self.cells.values() {
            cell.write(writer)?;
        }
        for event in &self.extra {
            writer.write_event(event.borrow())?;
        }
        writer.write_event(Event::End(self.start.to_end()))?;
        Ok(())
    }

    fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        self.write_element(writer)?;
        for event in &self.follow {
            writer.write_event(event.borrow())?;
        }
        Ok(())
    }
}

impl WorksheetTree {
    /// Parse a worksheet part. Fails with `MalformedWorksheet` when it has no `sheetData`.
    pub fn parse(xml: &[u8], part: &str) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);

        loop {
            let before = reader.buffer_position() as usize;
            match reader.read_event().map_err(|e| malformed(part, e))? {
                Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                    let sheet_data = e.into_owned();
                    let (rows, leading) = parse_rows(&mut reader, part)?;
                    let after = reader.buffer_position() as usize;
                    return Ok(Self::assemble(xml, part, before, after, sheet_data, rows, leading));
                }
                Event::Empty(e) if e.local_name().as_ref() == b"sheetData" => {
                    let after = reader.buffer_position() as usize;
                    let sheet_data = e.into_owned();
                    return Ok(Self::assemble(
                        xml,
                        part,
                        before,
                        after,
                        sheet_data,
                        BTreeMap::new(),
                        Vec::new(),
                    ));
                }
                Event::Eof => return Err(malformed(part, "no <sheetData> element")),
                _ => {}
            }
        }
    }

    fn assemble(
        xml: &[u8],
        part: &str,
        before: usize,
        after: usize,
        sheet_data: BytesStart<'static>,
        rows: BTreeMap<u32, Row>,
        leading: Vec<Event<'static>>,
    ) -> Self {
        Self {
            part: part.to_string(),
            head: strip_declaration(&xml[..before]).to_vec(),
            prefix: prefix_of(sheet_data.name().as_ref()),
            sheet_data,
            rows,
            leading,
            tail: xml[after..].to_vec(),
        }
    }

    pub fn part(&self) -> &str {
        &self.part
    }

    /// Row numbers in document order
    pub fn row_numbers(&self) -> Vec<u32> {
        self.rows.keys().copied().collect()
    }

    fn has_formula(&self, target: &CellRef) -> bool {
        self.rows
            .get(&target.row)
            .and_then(|row| row.cells.get(&target.col))
            .is_some_and(|cell| cell.has_child(b"f"))
    }

    /// Write one value into the tree, creating the row and cell when needed.
    ///
    /// Formula cells are left untouched and reported as skipped. Text goes
    /// through the shared-string table when `use_shared_strings` is set and
    /// is stored inline (`t="str"`) otherwise.
    pub fn apply(
        &mut self,
        update: &CellUpdate,
        strings: &mut SharedStringTable,
        use_shared_strings: bool,
    ) -> Result<UpdateStatus> {
        let target = CellRef::parse(&update.coordinate)?;
        let storable = match &update.value {
            CellValue::Number(n) => n.is_finite(),
            CellValue::Text(s) => !s.chars().any(is_forbidden_char),
            CellValue::Integer(_) => true,
        };
        if !storable {
            return Err(PatchError::InvalidValue(update.coordinate.clone()));
        }

        if self.has_formula(&target) {
            log::warn!(
                "Cell {} in '{}' holds a formula, leaving it untouched",
                update.coordinate,
                self.part
            );
            return Ok(UpdateStatus::SkippedFormula);
        }

        let part = self.part.as_str();
        let prefix = self.prefix.as_str();
        let row = self
            .rows
            .entry(target.row)
            .or_insert_with(|| Row::new(prefix, target.row));
        if raw_attribute(&row.start, b"r", part)?.is_none() {
            row.start = set_attribute(&row.start, "r", Some(target.row.to_string().as_str()), part)?;
        }
        row.widen_spans(target.col, part)?;

        let cell = row
            .cells
            .entry(target.col)
            .or_insert_with(|| Cell::new(prefix, &target));
        if raw_attribute(&cell.start, b"r", part)?.is_none() {
            cell.start = set_attribute(&cell.start, "r", Some(target.to_string().as_str()), part)?;
        }

        cell.children.retain(|c| c.local != b"v" && c.local != b"is");
        let (cell_type, text) = match &update.value {
            CellValue::Text(s) if use_shared_strings => (Some("s"), strings.index_of(s).to_string()),
            CellValue::Text(s) => (Some("str"), s.clone()),
            numeric => (None, numeric.numeric_text().unwrap_or_default()),
        };
        cell.start = set_attribute(&cell.start, "t", cell_type, part)?;
        cell.insert_value(prefix, &text);

        log::debug!(
            "Set {} in '{}' (t={})",
            update.coordinate,
            part,
            cell_type.unwrap_or("n")
        );
        Ok(UpdateStatus::Applied)
    }

    /// View of a single cell, `None` when the sheet has nothing there
    pub fn cell(&self, coordinate: &str) -> Result<Option<CellView>> {
        let target = CellRef::parse(coordinate)?;
        match self
            .rows
            .get(&target.row)
            .and_then(|row| row.cells.get(&target.col))
        {
            Some(cell) => cell.view(target, &self.part).map(Some),
            None => Ok(None),
        }
    }

    /// Every stored cell, row by row in ascending column order
    pub fn cells(&self) -> Result<Vec<CellView>> {
        let mut views = Vec::new();
        for (&row_number, row) in &self.rows {
            for (&col, cell) in &row.cells {
                views.push(cell.view(CellRef::new(row_number, col), &self.part)?);
            }
        }
        Ok(views)
    }

    /// Serialize back to worksheet XML, without an XML declaration
    pub fn to_xml(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::with_capacity(self.head.len() + self.tail.len() + 4096));
        writer.get_mut().extend_from_slice(&self.head);

        if self.rows.is_empty() && self.leading.is_empty() {
            writer.write_event(Event::Empty(self.sheet_data.borrow()))?;
        } else {
            writer.write_event(Event::Start(self.sheet_data.borrow()))?;
            for event in &self.leading {
                writer.write_event(event.borrow())?;
            }
            for row in self.rows.values() {
                row.write(&mut writer)?;
            }
            writer.write_event(Event::End(self.sheet_data.to_end()))?;
        }

        writer.get_mut().extend_from_slice(&self.tail);
        Ok(writer.into_inner())
    }
}

fn row_number(start: &BytesStart, previous: u32, part: &str) -> Result<u32> {
    match raw_attribute(start, b"r", part)? {
        Some(r) => match r.trim().parse::<u32>() {
            Ok(n) if (1..=MAX_ROW).contains(&n) => Ok(n),
            _ => Err(malformed(part, format!("invalid row number '{}'", r))),
        },
        None => Ok(previous + 1),
    }
}

fn column_index(start: &BytesStart, previous: u32, row: u32, part: &str) -> Result<u32> {
    match raw_attribute(start, b"r", part)? {
        Some(r) => match split_stored_ref(&r) {
            Some((col, _)) => Ok(col),
            None => Err(malformed(part, format!("invalid cell reference '{}'", r))),
        },
        None if previous < crate::cell_ref::MAX_COLUMN => Ok(previous + 1),
        None => Err(malformed(
            part,
            format!("too many cells in row {} after {}", row, col_to_letters(previous)),
        )),
    }
}

/// Rows of `sheetData`, plus the non-row nodes ahead of the first row.
/// Non-row nodes after a row stay attached to it.
fn parse_rows(
    reader: &mut Reader<&[u8]>,
    part: &str,
) -> Result<(BTreeMap<u32, Row>, Vec<Event<'static>>)> {
    let mut rows: BTreeMap<u32, Row> = BTreeMap::new();
    let mut leading = Vec::new();
    let mut last: Option<u32> = None;
    loop {
        let event = reader.read_event().map_err(|e| malformed(part, e))?;
        let previous = last.unwrap_or(0);
        let (number, start, cells, extra) = match event {
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                let start = e.into_owned();
                let number = row_number(&start, previous, part)?;
                let (cells, extra) = parse_cells(reader, part, number)?;
                (number, start, cells, extra)
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let start = e.into_owned();
                let number = row_number(&start, previous, part)?;
                (number, start, BTreeMap::new(), Vec::new())
            }
            Event::End(_) => break,
            Event::Text(t) if is_blank(&t) => continue,
            Event::Eof => return Err(malformed(part, "unterminated <sheetData>")),
            other => {
                let sink = match last.and_then(|n| rows.get_mut(&n)) {
                    Some(row) => &mut row.follow,
                    None => &mut leading,
                };
                let opens = matches!(other, Event::Start(_));
                sink.push(other.into_owned());
                if opens {
                    collect_subtree(reader, part, sink)?;
                }
                continue;
            }
        };

        let row = Row {
            start,
            cells,
            extra,
            follow: Vec::new(),
        };
        if rows.insert(number, row).is_some() {
            return Err(malformed(part, format!("duplicate row {}", number)));
        }
        last = Some(number);
    }
    Ok((rows, leading))
}

fn parse_cells(
    reader: &mut Reader<&[u8]>,
    part: &str,
    row: u32,
) -> Result<(BTreeMap<u32, Cell>, Vec<Event<'static>>)> {
    let mut cells = BTreeMap::new();
    let mut extra = Vec::new();
    let mut previous = 0u32;
    loop {
        match reader.read_event().map_err(|e| malformed(part, e))? {
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let start = e.into_owned();
                let col = column_index(&start, previous, row, part)?;
                let children = parse_cell_children(reader, part)?;
                if cells.insert(col, Cell { start, children }).is_some() {
                    return Err(malformed(part, format!("duplicate cell {}{}", col_to_letters(col), row)));
                }
                previous = col;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let start = e.into_owned();
                let col = column_index(&start, previous, row, part)?;
                let cell = Cell {
                    start,
                    children: Vec::new(),
                };
                if cells.insert(col, cell).is_some() {
                    return Err(malformed(part, format!("duplicate cell {}{}", col_to_letters(col), row)));
                }
                previous = col;
            }
            Event::Start(e) => {
                extra.push(Event::Start(e.into_owned()));
                collect_subtree(reader, part, &mut extra)?;
            }
            Event::End(_) => break,
            Event::Text(t) if is_blank(&t) => {}
            Event::Eof => return Err(malformed(part, format!("unterminated row {}", row))),
            other => extra.push(other.into_owned()),
        }
    }
    Ok((cells, extra))
}

fn parse_cell_children(reader: &mut Reader<&[u8]>, part: &str) -> Result<Vec<CellChild>> {
    let mut children = Vec::new();
    loop {
        match reader.read_event().map_err(|e| malformed(part, e))? {
            Event::Start(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                let mut events = vec![Event::Start(e.into_owned())];
                collect_subtree(reader, part, &mut events)?;
                children.push(CellChild { local, events });
            }
            Event::Empty(e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                children.push(CellChild {
                    local,
                    events: vec![Event::Empty(e.into_owned())],
                });
            }
            Event::End(_) => break,
            Event::Text(t) if is_blank(&t) => {}
            Event::Eof => return Err(malformed(part, "unterminated cell")),
            other => children.push(CellChild {
                local: Vec::new(),
                events: vec![other.into_owned()],
            }),
        }
    }
    Ok(children)
}

/// Apply `updates` in order to one worksheet part.
///
/// Either every update is applied (or skipped as a formula cell) and the
/// new XML is returned, or the first error aborts the whole call.
pub fn patch(
    worksheet_xml: &[u8],
    part: &str,
    updates: &[CellUpdate],
    strings: &mut SharedStringTable,
    use_shared_strings: bool,
) -> Result<PatchedWorksheet> {
    let mut tree = WorksheetTree::parse(worksheet_xml, part)?;
    let mut statuses = Vec::with_capacity(updates.len());
    for update in updates {
        statuses.push(tree.apply(update, strings, use_shared_strings)?);
    }
    Ok(PatchedWorksheet {
        xml: tree.to_xml()?,
        statuses,
    })
}
