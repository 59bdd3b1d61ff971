//! Text scene codec and the field-level reader/writer that component
//! vtables serialize through.
//!
//! Grammar:
//!
//! ```text
//! scene        := entity*
//! entity       := "entity" STRING "{" entity_body* "}"
//! entity_body  := "position" f32 f32 f32 ";"
//!               | "rotation" f32 f32 f32 ";"     (Euler degrees)
//!               | "scale"    f32 f32 f32 ";"
//!               | COMPONENT_NAME "{" field* "}"
//! field        := IDENTIFIER value
//! ```
//!
//! Floats are written with Rust's shortest round-trip formatting, so a
//! reparse recovers the exact f32 bit pattern. Loads are all-or-nothing:
//! every entity created during a failed load is destroyed before the error
//! returns.

use lantern_core::math::{quat_from_euler_deg, quat_to_euler_deg, Vec3};

use super::error::SceneError;
use super::lexer::{Lexer, Token};
use crate::registry::ComponentRegistry;
use crate::scene::Scene;

// ---------------------------------------------------------------------------
// TextWriter
// ---------------------------------------------------------------------------

/// Indentation-aware writer for the scene text format.
///
/// Component `serialize_text` hooks see only the `field_*` surface; the
/// scene writer and the hot-reload snapshot drive the block structure.
pub struct TextWriter {
    out: String,
    indent: usize,
}

fn escape_into(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

impl TextWriter {
    pub(crate) fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    pub(crate) fn into_string(self) -> String {
        self.out
    }

    fn push_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
    }

    /// Writes one raw line at the current indent.
    pub(crate) fn line(&mut self, text: &str) {
        self.push_indent();
        self.out.push_str(text);
        self.out.push('\n');
    }

    /// Opens a block: `header {`, increasing the indent.
    pub(crate) fn open(&mut self, header: &str) {
        self.push_indent();
        self.out.push_str(header);
        self.out.push_str(" {\n");
        self.indent += 1;
    }

    /// Closes the innermost block.
    pub(crate) fn close(&mut self) {
        self.indent -= 1;
        self.line("}");
    }

    fn field_line(&mut self, name: &str, value: std::fmt::Arguments<'_>) {
        self.push_indent();
        self.out.push_str(name);
        self.out.push(' ');
        self.out.push_str(&value.to_string());
        self.out.push('\n');
    }

    pub fn field_f32(&mut self, name: &str, v: f32) {
        self.field_line(name, format_args!("{v}"));
    }

    pub fn field_i32(&mut self, name: &str, v: i32) {
        self.field_line(name, format_args!("{v}"));
    }

    pub fn field_u32(&mut self, name: &str, v: u32) {
        self.field_line(name, format_args!("{v}"));
    }

    /// Booleans are stored as `0` / `1` number tokens.
    pub fn field_bool(&mut self, name: &str, v: bool) {
        self.field_line(name, format_args!("{}", v as u32));
    }

    pub fn field_vec3(&mut self, name: &str, v: Vec3) {
        self.field_line(name, format_args!("{} {} {}", v.x, v.y, v.z));
    }

    pub fn field_str(&mut self, name: &str, s: &str) {
        self.push_indent();
        self.out.push_str(name);
        self.out.push(' ');
        escape_into(&mut self.out, s);
        self.out.push('\n');
    }

    /// Optional reference field: a quoted path, or the `null` token.
    pub fn field_ref(&mut self, name: &str, r: Option<&str>) {
        match r {
            Some(s) => self.field_str(name, s),
            None => self.field_line(name, format_args!("null")),
        }
    }
}

// ---------------------------------------------------------------------------
// TextReader
// ---------------------------------------------------------------------------

/// Token-level reader shared by the scene parser, component `deserialize_text`
/// hooks, and the hot-reload restore pass.
///
/// A component deserializer is handed the reader positioned just past its
/// opening `{`; it pulls named fields with [`next_field`](Self::next_field)
/// until that returns `None`, which consumes the closing `}`.
pub struct TextReader<'a> {
    lex: Lexer<'a>,
}

impl<'a> TextReader<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            lex: Lexer::new(src),
        }
    }

    /// Current line, for diagnostics.
    pub fn line(&self) -> u32 {
        self.lex.line()
    }

    fn err(&self, message: impl Into<String>) -> SceneError {
        SceneError::parse(self.lex.line(), message)
    }

    pub(crate) fn next_token(&mut self) -> Result<Option<Token<'a>>, SceneError> {
        self.lex.next()
    }

    fn expect_token(&mut self, what: &str) -> Result<Token<'a>, SceneError> {
        self.next_token()?
            .ok_or_else(|| self.err(format!("unexpected end of input, expected {what}")))
    }

    pub(crate) fn expect_lbrace(&mut self) -> Result<(), SceneError> {
        match self.expect_token("'{'")? {
            Token::LBrace => Ok(()),
            tok => Err(self.err(format!("expected '{{', found {}", tok.describe()))),
        }
    }

    pub(crate) fn expect_semi(&mut self) -> Result<(), SceneError> {
        match self.expect_token("';'")? {
            Token::Semi => Ok(()),
            tok => Err(self.err(format!("expected ';', found {}", tok.describe()))),
        }
    }

    pub(crate) fn expect_string(&mut self) -> Result<String, SceneError> {
        match self.expect_token("a string")? {
            Token::Str(s) => Ok(s),
            tok => Err(self.err(format!("expected a string, found {}", tok.describe()))),
        }
    }

    /// Next field name inside a component body, or `None` once the closing
    /// `}` has been consumed.
    pub fn next_field(&mut self) -> Result<Option<&'a str>, SceneError> {
        match self.expect_token("a field name or '}'")? {
            Token::Ident(name) => Ok(Some(name)),
            Token::RBrace => Ok(None),
            tok => Err(self.err(format!(
                "expected a field name or '}}', found {}",
                tok.describe()
            ))),
        }
    }

    pub fn f32(&mut self) -> Result<f32, SceneError> {
        match self.expect_token("a number")? {
            Token::Number(text) => text
                .parse::<f32>()
                .map_err(|_| self.err(format!("malformed number '{text}'"))),
            tok => Err(self.err(format!("expected a number, found {}", tok.describe()))),
        }
    }

    pub fn i32(&mut self) -> Result<i32, SceneError> {
        match self.expect_token("a number")? {
            Token::Number(text) => text
                .parse::<i32>()
                .map_err(|_| self.err(format!("malformed integer '{text}'"))),
            tok => Err(self.err(format!("expected a number, found {}", tok.describe()))),
        }
    }

    pub fn u32(&mut self) -> Result<u32, SceneError> {
        match self.expect_token("a number")? {
            Token::Number(text) => text
                .parse::<u32>()
                .map_err(|_| self.err(format!("malformed integer '{text}'"))),
            tok => Err(self.err(format!("expected a number, found {}", tok.describe()))),
        }
    }

    pub fn bool(&mut self) -> Result<bool, SceneError> {
        Ok(self.u32()? != 0)
    }

    pub fn vec3(&mut self) -> Result<Vec3, SceneError> {
        Ok(Vec3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    pub fn string(&mut self) -> Result<String, SceneError> {
        self.expect_string()
    }

    /// Optional reference field: `null` reads as `None`.
    pub fn reference(&mut self) -> Result<Option<String>, SceneError> {
        match self.expect_token("a string or 'null'")? {
            Token::Str(s) => Ok(Some(s)),
            Token::Null => Ok(None),
            tok => Err(self.err(format!(
                "expected a string or 'null', found {}",
                tok.describe()
            ))),
        }
    }

    /// Skips one field value: a run of consecutive number, string, or `null`
    /// tokens. Lets deserializers ignore fields they no longer know.
    pub fn skip_value(&mut self) -> Result<(), SceneError> {
        let mut consumed = 0;
        while matches!(
            self.lex.peek()?,
            Some(Token::Number(_) | Token::Str(_) | Token::Null)
        ) {
            self.lex.next()?;
            consumed += 1;
        }
        if consumed == 0 {
            return Err(self.err("expected a field value"));
        }
        Ok(())
    }

    /// Consumes a flat component body through its closing `}`. Used when a
    /// snapshot entry's type is no longer registered.
    pub(crate) fn skip_body(&mut self) -> Result<(), SceneError> {
        loop {
            match self.expect_token("'}'")? {
                Token::RBrace => return Ok(()),
                Token::LBrace => return Err(self.err("unexpected '{' inside component body")),
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scene codec
// ---------------------------------------------------------------------------

fn vec3_line(name: &str, v: Vec3) -> String {
    format!("{name} {} {} {};", v.x, v.y, v.z)
}

/// Serializes a whole scene to text.
pub fn write_scene_text(scene: &Scene, registry: &ComponentRegistry) -> String {
    let mut w = TextWriter::new();
    for (_, entity) in scene.entities() {
        let mut header = String::from("entity ");
        escape_into(&mut header, entity.name());
        w.open(&header);
        w.line(&vec3_line("position", entity.position));
        w.line(&vec3_line("rotation", quat_to_euler_deg(&entity.rotation)));
        w.line(&vec3_line("scale", entity.scale));
        for comp in entity.components() {
            let info = registry
                .get(comp.uid)
                .expect("live component with unregistered uid");
            w.open(info.name());
            let ptr = scene.component_ptr(*comp);
            // SAFETY: the slot is live (scene invariant), and the vtable
            // belongs to the slot's type.
            unsafe { (info.vtable().serialize_text)(ptr.as_ptr(), &mut w) };
            w.close();
        }
        w.close();
    }
    w.into_string()
}

/// Parses scene text, appending its entities to `scene`.
///
/// On any error every entity this call created is destroyed before the
/// error is returned, leaving the scene as it was.
pub fn read_scene_text(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    src: &str,
) -> Result<(), SceneError> {
    let mut created = Vec::new();
    let result = read_scene_inner(scene, registry, src, &mut created);
    if result.is_err() {
        for &index in created.iter().rev() {
            scene.destroy_entity(registry, index);
        }
    }
    result
}

fn read_scene_inner(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    src: &str,
    created: &mut Vec<u32>,
) -> Result<(), SceneError> {
    let mut r = TextReader::new(src);
    while let Some(tok) = r.next_token()? {
        match tok {
            Token::Ident("entity") => {
                let name = r.expect_string()?;
                r.expect_lbrace()?;
                let index = scene.create_entity(Some(&name));
                created.push(index);
                read_entity_body(scene, registry, &mut r, index)?;
            }
            tok => {
                return Err(SceneError::parse(
                    r.line(),
                    format!("expected 'entity', found {}", tok.describe()),
                ))
            }
        }
    }
    Ok(())
}

fn read_entity_body(
    scene: &mut Scene,
    registry: &ComponentRegistry,
    r: &mut TextReader<'_>,
    index: u32,
) -> Result<(), SceneError> {
    loop {
        let tok = r.next_token()?.ok_or_else(|| {
            SceneError::parse(r.line(), "unexpected end of input inside entity")
        })?;
        match tok {
            Token::RBrace => return Ok(()),
            Token::Ident("position") => {
                let v = r.vec3()?;
                r.expect_semi()?;
                scene.entity_mut(index).unwrap().position = v;
            }
            Token::Ident("rotation") => {
                let v = r.vec3()?;
                r.expect_semi()?;
                scene.entity_mut(index).unwrap().rotation = quat_from_euler_deg(v);
            }
            Token::Ident("scale") => {
                let v = r.vec3()?;
                r.expect_semi()?;
                scene.entity_mut(index).unwrap().scale = v;
            }
            Token::Ident(comp_name) => {
                let uid = registry.uid_of(comp_name).ok_or_else(|| {
                    SceneError::UnknownComponent {
                        name: comp_name.to_string(),
                    }
                })?;
                r.expect_lbrace()?;
                let comp = scene.add_component(registry, index, uid);
                let info = registry.get(uid).unwrap();
                let ptr = scene.component_ptr(comp);
                // SAFETY: the slot was just constructed by add_component and
                // the vtable matches its type.
                unsafe { (info.vtable().deserialize_text)(ptr.as_ptr(), r)? };
            }
            tok => {
                return Err(SceneError::parse(
                    r.line(),
                    format!("unexpected {} inside entity", tok.describe()),
                ))
            }
        }
    }
}
