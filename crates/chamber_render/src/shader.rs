//! WGSL shader programs.
//!
//! Each stage is compiled on its own with naga (parse + validate), then the
//! two stages are linked: the stage interface and the resource bindings must
//! agree. Linking produces a [`LinkedProgram`] that a backend turns into a GPU
//! program, and a table of uniforms that callers query by name.

use std::collections::BTreeMap;
use std::fmt;

use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{AddressSpace, Binding, Handle, Module, Type, TypeInner};

use crate::backend::GraphicsBackend;
use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    fn naga_stage(self) -> naga::ShaderStage {
        match self {
            Self::Vertex => naga::ShaderStage::Vertex,
            Self::Fragment => naga::ShaderStage::Fragment,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Binding slot of a uniform resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation {
    pub group: u32,
    pub binding: u32,
}

impl fmt::Display for UniformLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@group({}) @binding({})", self.group, self.binding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    /// Uniform buffer of `size` bytes.
    Buffer { size: u32 },
    Texture,
    Sampler,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    pub name: String,
    pub location: UniformLocation,
    pub kind: UniformKind,
    /// False when no entry point reads the uniform.
    pub active: bool,
}

/// A stage that parsed and validated.
pub struct CompiledStage {
    stage: ShaderStage,
    source: String,
    entry_point: String,
    entry_index: usize,
    module: Module,
    info: ModuleInfo,
}

impl CompiledStage {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

/// Everything a backend needs to build a GPU program.
#[derive(Debug, Clone)]
pub struct LinkedProgram {
    pub vertex_source: String,
    pub vertex_entry: String,
    pub fragment_source: String,
    pub fragment_entry: String,
    pub uniforms: Vec<UniformInfo>,
}

pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<CompiledStage, RenderError> {
    let compile_error = |log: String| RenderError::ShaderCompile { stage, log };

    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| compile_error(err.emit_to_string(source)))?;
    let info = Validator::new(ValidationFlags::all(), Capabilities::default())
        .validate(&module)
        .map_err(|err| compile_error(err.emit_to_string(source)))?;

    let wanted = stage.naga_stage();
    let (entry_index, entry_point) = module
        .entry_points
        .iter()
        .enumerate()
        .find(|(_, ep)| ep.stage == wanted)
        .map(|(index, ep)| (index, ep.name.clone()))
        .ok_or_else(|| compile_error(format!("no @{} entry point in module", stage.label())))?;

    Ok(CompiledStage {
        stage,
        source: source.to_string(),
        entry_point,
        entry_index,
        module,
        info,
    })
}

/// Links a vertex and a fragment stage. The compiled stage modules are
/// consumed; only sources, entry points and the uniform table survive.
pub fn link(vertex: CompiledStage, fragment: CompiledStage) -> Result<LinkedProgram, RenderError> {
    let mut errors = Vec::new();
    if vertex.stage != ShaderStage::Vertex {
        errors.push(format!("expected a vertex stage, got {}", vertex.stage));
    }
    if fragment.stage != ShaderStage::Fragment {
        errors.push(format!("expected a fragment stage, got {}", fragment.stage));
    }

    let vertex_outputs = stage_outputs(&vertex);
    let fragment_inputs = stage_inputs(&fragment);
    for (location, input_ty) in &fragment_inputs {
        match vertex_outputs.get(location) {
            None => errors.push(format!(
                "fragment input @location({location}) is not written by the vertex stage"
            )),
            Some(output_ty) if output_ty != input_ty => errors.push(format!(
                "@location({location}) type mismatch: vertex writes {output_ty:?}, fragment reads {input_ty:?}"
            )),
            Some(_) => {}
        }
    }

    if !stage_outputs(&fragment).contains_key(&0) {
        errors.push("fragment stage does not write color @location(0)".to_string());
    }

    let mut uniforms: Vec<UniformInfo> = Vec::new();
    for candidate in stage_uniforms(&vertex).into_iter().chain(stage_uniforms(&fragment)) {
        if let Some(existing) = uniforms.iter_mut().find(|u| u.name == candidate.name) {
            if existing.location != candidate.location || existing.kind != candidate.kind {
                errors.push(format!(
                    "uniform '{}' declared differently across stages ({} {:?} vs {} {:?})",
                    candidate.name,
                    existing.location,
                    existing.kind,
                    candidate.location,
                    candidate.kind
                ));
            }
            existing.active |= candidate.active;
            continue;
        }
        if let Some(clash) = uniforms.iter().find(|u| u.location == candidate.location) {
            errors.push(format!(
                "uniforms '{}' and '{}' share {}",
                clash.name, candidate.name, candidate.location
            ));
            continue;
        }
        uniforms.push(candidate);
    }

    if !errors.is_empty() {
        return Err(RenderError::ShaderLink {
            log: errors.join("\n"),
        });
    }

    uniforms.sort_by_key(|u| u.location);
    Ok(LinkedProgram {
        vertex_source: vertex.source,
        vertex_entry: vertex.entry_point,
        fragment_source: fragment.source,
        fragment_entry: fragment.entry_point,
        uniforms,
    })
}

fn entry(stage: &CompiledStage) -> &naga::EntryPoint {
    &stage.module.entry_points[stage.entry_index]
}

fn stage_inputs(stage: &CompiledStage) -> BTreeMap<u32, TypeInner> {
    let mut locations = BTreeMap::new();
    for argument in &entry(stage).function.arguments {
        collect_locations(&stage.module, argument.ty, argument.binding.as_ref(), &mut locations);
    }
    locations
}

fn stage_outputs(stage: &CompiledStage) -> BTreeMap<u32, TypeInner> {
    let mut locations = BTreeMap::new();
    if let Some(result) = &entry(stage).function.result {
        collect_locations(&stage.module, result.ty, result.binding.as_ref(), &mut locations);
    }
    locations
}

fn collect_locations(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut BTreeMap<u32, TypeInner>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            out.insert(*location, module.types[ty].inner.clone());
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

fn stage_uniforms(stage: &CompiledStage) -> Vec<UniformInfo> {
    let usage = stage.info.get_entry_point(stage.entry_index);
    stage
        .module
        .global_variables
        .iter()
        .filter_map(|(handle, var)| {
            let binding = var.binding.as_ref()?;
            let kind = match var.space {
                AddressSpace::Uniform => UniformKind::Buffer {
                    size: stage.module.types[var.ty]
                        .inner
                        .size(stage.module.to_ctx()),
                },
                AddressSpace::Handle => match stage.module.types[var.ty].inner {
                    TypeInner::Image { .. } => UniformKind::Texture,
                    TypeInner::Sampler { .. } => UniformKind::Sampler,
                    _ => return None,
                },
                _ => return None,
            };
            Some(UniformInfo {
                name: var.name.clone().unwrap_or_default(),
                location: UniformLocation {
                    group: binding.group,
                    binding: binding.binding,
                },
                kind,
                active: !usage[handle].is_empty(),
            })
        })
        .collect()
}

pub struct ShaderProgram<B: GraphicsBackend> {
    raw: B::Program,
    uniforms: Vec<UniformInfo>,
    label: String,
}

impl<B: GraphicsBackend> ShaderProgram<B> {
    /// Compiles, links and uploads a WGSL stage pair. Nothing is created on
    /// the backend unless both stages compile and link.
    pub fn new(
        backend: &mut B,
        vertex_source: &str,
        fragment_source: &str,
        label: &str,
    ) -> Result<Self, RenderError> {
        let vertex = compile_stage(ShaderStage::Vertex, vertex_source)?;
        let fragment = compile_stage(ShaderStage::Fragment, fragment_source)?;
        let linked = link(vertex, fragment)?;
        let raw = backend.create_program(&linked, label)?;
        log::debug!(
            "Shader program '{}' linked ({} uniforms)",
            label,
            linked.uniforms.len()
        );
        Ok(Self {
            raw,
            uniforms: linked.uniforms,
            label: label.to_string(),
        })
    }

    pub fn bind(&self, backend: &mut B) {
        backend.use_program(Some(&self.raw));
    }

    pub fn unbind(&self, backend: &mut B) {
        backend.use_program(None);
    }

    pub fn uniform_location(&self, name: &str) -> Result<UniformLocation, RenderError> {
        self.uniforms
            .iter()
            .find(|u| u.active && u.name == name)
            .map(|u| u.location)
            .ok_or_else(|| RenderError::UniformNotFound {
                name: name.to_string(),
            })
    }

    pub fn uniforms(&self) -> &[UniformInfo] {
        &self.uniforms
    }

    pub fn raw(&self) -> &B::Program {
        &self.raw
    }

    pub fn release(self) {
        log::debug!("Releasing shader program '{}'", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{GpuCommand, RecordingBackend};

    const VERTEX: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0)
var<uniform> u_projection: mat4x4<f32>;

@vertex
fn vs_main(@location(0) position: vec2<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.uv = uv;
    out.clip_position = u_projection * vec4<f32>(position, 0.0, 1.0);
    return out;
}
"#;

    const FRAGMENT: &str = r#"
@group(1) @binding(0)
var u_texture: texture_2d<f32>;
@group(1) @binding(1)
var u_sampler: sampler;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(u_texture, u_sampler, uv);
}
"#;

    fn program_creations(backend: &RecordingBackend) -> usize {
        backend
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::CreateProgram { .. }))
            .count()
    }

    #[test]
    fn valid_pair_links_and_reflects_uniforms() {
        let mut backend = RecordingBackend::new();
        let program = ShaderProgram::new(&mut backend, VERTEX, FRAGMENT, "test")
            .expect("program should link");

        assert_eq!(
            program.uniform_location("u_projection").expect("projection"),
            UniformLocation { group: 0, binding: 0 }
        );
        assert_eq!(
            program.uniform_location("u_texture").expect("texture"),
            UniformLocation { group: 1, binding: 0 }
        );
        let projection = &program.uniforms()[0];
        assert_eq!(projection.kind, UniformKind::Buffer { size: 64 });
        assert_eq!(program_creations(&backend), 1);
    }

    #[test]
    fn syntax_error_fails_compile_with_diagnostic() {
        let mut backend = RecordingBackend::new();
        let broken = "@vertex fn vs_main( -> @builtin(position) vec4<f32> {";
        let err = ShaderProgram::new(&mut backend, broken, FRAGMENT, "broken")
            .err()
            .expect("broken source must fail");

        match err {
            RenderError::ShaderCompile { stage, log } => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(!log.trim().is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(program_creations(&backend), 0);
    }

    #[test]
    fn fragment_compile_error_names_fragment_stage() {
        let mut backend = RecordingBackend::new();
        let broken = "@fragment fn fs_main() -> @location(0) vec4<f32> { return undefined_value; }";
        let err = ShaderProgram::new(&mut backend, VERTEX, broken, "broken")
            .err()
            .expect("unknown identifier must fail");
        assert!(matches!(
            err,
            RenderError::ShaderCompile {
                stage: ShaderStage::Fragment,
                ..
            }
        ));
        assert_eq!(program_creations(&backend), 0);
    }

    #[test]
    fn module_without_matching_entry_point_fails_compile() {
        let err = compile_stage(ShaderStage::Vertex, FRAGMENT)
            .err()
            .expect("fragment-only module is not a vertex stage");
        match err {
            RenderError::ShaderCompile { stage, log } => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(log.contains("@vertex"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unwritten_fragment_input_fails_link() {
        let fragment = r#"
@fragment
fn fs_main(@location(3) tint: vec4<f32>) -> @location(0) vec4<f32> {
    return tint;
}
"#;
        let mut backend = RecordingBackend::new();
        let err = ShaderProgram::new(&mut backend, VERTEX, fragment, "mismatch")
            .err()
            .expect("link must fail");
        match err {
            RenderError::ShaderLink { log } => assert!(log.contains("@location(3)")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(program_creations(&backend), 0);
    }

    #[test]
    fn interface_type_mismatch_fails_link() {
        let fragment = r#"
@fragment
fn fs_main(@location(0) uv: vec4<f32>) -> @location(0) vec4<f32> {
    return uv;
}
"#;
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).expect("vertex compiles");
        let fragment = compile_stage(ShaderStage::Fragment, fragment).expect("fragment compiles");
        let err = link(vertex, fragment).expect_err("type mismatch must fail");
        assert!(matches!(err, RenderError::ShaderLink { ref log } if log.contains("type mismatch")));
    }

    #[test]
    fn shared_slot_between_different_uniforms_fails_link() {
        let fragment = r#"
@group(0) @binding(0)
var<uniform> u_tint: vec4<f32>;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return u_tint * vec4<f32>(uv, 0.0, 1.0);
}
"#;
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).expect("vertex compiles");
        let fragment = compile_stage(ShaderStage::Fragment, fragment).expect("fragment compiles");
        let err = link(vertex, fragment).expect_err("slot clash must fail");
        assert!(matches!(err, RenderError::ShaderLink { ref log } if log.contains("u_tint")));
    }

    #[test]
    fn unknown_uniform_is_not_found() {
        let mut backend = RecordingBackend::new();
        let program = ShaderProgram::new(&mut backend, VERTEX, FRAGMENT, "test")
            .expect("program should link");
        let err = program
            .uniform_location("u_projecton")
            .expect_err("misspelled name");
        assert!(matches!(err, RenderError::UniformNotFound { ref name } if name == "u_projecton"));
    }

    #[test]
    fn unused_uniform_is_inactive_and_not_found() {
        let fragment = r#"
@group(2) @binding(0)
var<uniform> u_unused: vec4<f32>;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0);
}
"#;
        let mut backend = RecordingBackend::new();
        let program = ShaderProgram::new(&mut backend, VERTEX, fragment, "unused")
            .expect("program should link");

        let info = program
            .uniforms()
            .iter()
            .find(|u| u.name == "u_unused")
            .expect("declared uniform is reflected");
        assert!(!info.active);
        assert!(matches!(
            program.uniform_location("u_unused"),
            Err(RenderError::UniformNotFound { .. })
        ));
    }

    #[test]
    fn bind_and_unbind_switch_active_program() {
        let mut backend = RecordingBackend::new();
        let program = ShaderProgram::new(&mut backend, VERTEX, FRAGMENT, "test")
            .expect("program should link");
        backend.clear_commands();

        program.bind(&mut backend);
        program.unbind(&mut backend);
        let commands = backend.commands();
        assert!(matches!(commands[0], GpuCommand::UseProgram { id: Some(_) }));
        assert_eq!(commands[1], GpuCommand::UseProgram { id: None });
    }

    #[test]
    fn release_frees_program() {
        let mut backend = RecordingBackend::new();
        let program = ShaderProgram::new(&mut backend, VERTEX, FRAGMENT, "test")
            .expect("program should link");
        program.release();
        assert!(backend
            .commands()
            .iter()
            .any(|c| matches!(c, GpuCommand::DeleteProgram { .. })));
    }
}
