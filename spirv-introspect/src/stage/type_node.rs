use crate::VarType;
use bytemuck::{Pod, Zeroable};
use fnv::{FnvHashMap, FnvHashSet};
use spirv_introspect_base::{BasedOffset, BasedSpan};
use std::fmt::Write;

const SPEC_CONSTANT_BIT: u32 = 1 << 31;
const VALUE_MASK: u32 = !SPEC_CONSTANT_BIT;

/// One array dimension as stored in the arena: either a literal length or the id of the
/// specialization constant that provides it.
///
/// Whenever extents are stored in a span they are ordered innermost first, so `var[Z][Y][X]` is
/// stored as `[X, Y, Z]`.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct ArrayExtent(u32);

impl ArrayExtent {
    pub fn literal(count: u32) -> Option<Self> {
        if count & SPEC_CONSTANT_BIT != 0 {
            None
        } else {
            Some(ArrayExtent(count))
        }
    }

    pub fn spec_constant(spec_id: u32) -> Option<Self> {
        if spec_id & SPEC_CONSTANT_BIT != 0 {
            None
        } else {
            Some(ArrayExtent(spec_id | SPEC_CONSTANT_BIT))
        }
    }

    pub fn is_spec_constant(self) -> bool {
        self.0 & SPEC_CONSTANT_BIT != 0
    }

    pub fn spec_constant_id(self) -> Option<u32> {
        if self.is_spec_constant() {
            Some(self.0 & VALUE_MASK)
        } else {
            None
        }
    }

    pub fn literal_count(self) -> Option<u32> {
        if self.is_spec_constant() {
            None
        } else {
            Some(self.0)
        }
    }

    /// A literal extent of 0. Illegal for push constant block members and anywhere except the
    /// last member of a storage buffer block.
    pub fn is_runtime_sized(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for ArrayExtent {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self.spec_constant_id() {
            Some(id) => write!(f, "SpecConstant({})", id),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Shape and decorations of a single type
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Pod, Zeroable)]
pub struct TypeInfo {
    last_row: u8,
    last_col: u8,
    row_major: u8,
    var_type: u8,
    // 0 means not a matrix
    matrix_stride: u16,
    restrict: u8,
    aliased: u8,
}

impl TypeInfo {
    pub fn new(
        var_type: VarType,
        rows: u8,
        columns: u8,
        row_major: bool,
        matrix_stride: u16,
    ) -> Self {
        TypeInfo {
            last_row: rows.saturating_sub(1),
            last_col: columns.saturating_sub(1),
            row_major: row_major as u8,
            var_type: var_type as u8,
            matrix_stride,
            restrict: 0,
            aliased: 0,
        }
    }

    pub fn with_decorations(
        mut self,
        restrict: bool,
        aliased: bool,
    ) -> Self {
        self.restrict = restrict as u8;
        self.aliased = aliased as u8;
        self
    }

    pub fn rows(&self) -> u32 {
        self.last_row as u32 + 1
    }

    pub fn columns(&self) -> u32 {
        self.last_col as u32 + 1
    }

    pub fn is_scalar(&self) -> bool {
        self.last_row == 0 && self.last_col == 0
    }

    pub fn is_vector(&self) -> bool {
        self.last_row > 0 && self.last_col == 0
    }

    pub fn is_matrix(&self) -> bool {
        self.last_col > 0
    }

    /// `false` implies column-major
    pub fn is_row_major(&self) -> bool {
        self.row_major != 0
    }

    pub fn matrix_stride(&self) -> u32 {
        self.matrix_stride as u32
    }

    pub fn var_type(&self) -> VarType {
        VarType::from_u8(self.var_type)
    }

    pub fn is_restrict(&self) -> bool {
        self.restrict != 0
    }

    pub fn is_aliased(&self) -> bool {
        self.aliased != 0
    }
}

/// A type node in the arena. Struct types own a contiguous block of `MemberInfo` slots.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct TypeNode {
    pub type_name: BasedSpan<u8>,
    pub extents: BasedSpan<ArrayExtent>,
    pub info: TypeInfo,
    pub members: BasedSpan<MemberInfo>,
}

/// Per-member data of a struct, stored in the parent's member block
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct MemberInfo {
    pub ty: BasedOffset<TypeNode>,
    pub name: BasedSpan<u8>,
    /// Size of the entire member, so for an array it includes every element
    pub size: u32,
    pub offset: u32,
    /// Only relevant if the member's type is an array
    pub stride: u32,
}

/// Read-only view of a `TypeNode` resolved against a finished arena
#[derive(Copy, Clone)]
pub struct TypeView<'a> {
    bytes: &'a [u8],
    offset: BasedOffset<TypeNode>,
    node: &'a TypeNode,
}

impl<'a> TypeView<'a> {
    pub fn new(
        bytes: &'a [u8],
        offset: BasedOffset<TypeNode>,
    ) -> Option<Self> {
        offset
            .resolve(bytes)
            .map(|node| TypeView {
                bytes,
                offset,
                node,
            })
    }

    /// Location of the node in the arena. Types shared by several members have the same offset.
    pub fn offset(&self) -> BasedOffset<TypeNode> {
        self.offset
    }

    pub fn name(&self) -> Option<&'a str> {
        if self.node.type_name.is_empty() {
            None
        } else {
            Some(self.node.type_name.resolve_str(self.bytes))
        }
    }

    pub fn extents(&self) -> &'a [ArrayExtent] {
        self.node.extents.resolve(self.bytes)
    }

    pub fn is_array(&self) -> bool {
        !self.node.extents.is_empty()
    }

    /// Runtime-sized arrays are only legal in the outermost dimension
    pub fn is_runtime_sized_array(&self) -> bool {
        self.extents()
            .last()
            .map(|x| x.is_runtime_sized())
            .unwrap_or(false)
    }

    pub fn info(&self) -> TypeInfo {
        self.node.info
    }

    pub fn is_struct(&self) -> bool {
        !self.node.members.is_empty()
    }

    pub fn member_count(&self) -> usize {
        self.node.members.len()
    }

    pub fn member(
        &self,
        index: usize,
    ) -> Option<MemberView<'a>> {
        self.node
            .members
            .resolve(self.bytes)
            .get(index)
            .map(|info| MemberView {
                bytes: self.bytes,
                info,
            })
    }

    pub fn members(&self) -> impl Iterator<Item = MemberView<'a>> + 'a {
        let bytes = self.bytes;
        self.node
            .members
            .resolve(bytes)
            .iter()
            .map(move |info| MemberView { bytes, info })
    }

    pub fn is_last_member_runtime_sized(&self) -> bool {
        self.member(self.member_count().wrapping_sub(1))
            .and_then(|x| x.ty())
            .map(|x| x.is_runtime_sized_array())
            .unwrap_or(false)
    }

    /// Visits this type and every distinct type reachable through its members, parents before
    /// children. A type shared by several members is visited once.
    pub fn visit_pre_order<F: FnMut(TypeView<'a>)>(
        &self,
        mut f: F,
    ) {
        let mut visited = FnvHashSet::default();
        let mut stack = vec![*self];
        while let Some(ty) = stack.pop() {
            if !visited.insert(ty.offset) {
                continue;
            }

            // Push in reverse so that members are visited in declaration order
            let members: Vec<_> = ty.members().filter_map(|x| x.ty()).collect();
            stack.extend(members.into_iter().rev());
            f(ty);
        }
    }

    /// A flattened description of the memory layout of this type, ignoring names. Two types with
    /// equal signatures have identical layouts. Array extents are recorded as stored.
    pub fn layout_signature(&self) -> Vec<u32> {
        self.layout_signature_with(|extent| Ok::<u32, std::convert::Infallible>(extent.0))
            .unwrap_or_else(|e| match e {})
    }

    /// Like `layout_signature`, with every array extent replaced by the value `resolve` returns
    /// for it.
    ///
    /// Each structurally distinct type is described once, members refer to their type by its
    /// index in the description. Whether equal types share a node does not change the result.
    pub fn layout_signature_with<E, F>(
        &self,
        mut resolve: F,
    ) -> Result<Vec<u32>, E>
    where
        F: FnMut(ArrayExtent) -> Result<u32, E>,
    {
        let mut type_indices: FnvHashMap<BasedOffset<TypeNode>, u32> = Default::default();
        let mut descriptions: FnvHashMap<Vec<u32>, u32> = Default::default();
        let mut signature = Vec::default();

        // Children are described before their parent
        let mut stack = vec![(*self, false)];
        while let Some((ty, children_described)) = stack.pop() {
            if type_indices.contains_key(&ty.offset) {
                continue;
            }

            if !children_described {
                stack.push((ty, true));
                let members: Vec<_> = ty.members().filter_map(|x| x.ty()).collect();
                stack.extend(members.into_iter().rev().map(|x| (x, false)));
                continue;
            }

            let info = ty.info();
            let mut description = vec![
                info.var_type() as u32,
                info.rows(),
                info.columns(),
                info.is_row_major() as u32,
                info.matrix_stride(),
                ty.extents().len() as u32,
            ];
            for extent in ty.extents() {
                description.push(resolve(*extent)?);
            }
            description.push(ty.member_count() as u32);
            for member in ty.members() {
                let index = member
                    .ty()
                    .and_then(|x| type_indices.get(&x.offset).copied())
                    .unwrap_or(u32::MAX);
                description.extend_from_slice(&[
                    index,
                    member.offset(),
                    member.size(),
                    member.stride(),
                ]);
            }

            let next_index = descriptions.len() as u32;
            let index = match descriptions.get(&description) {
                Some(index) => *index,
                None => {
                    signature.push(description.len() as u32);
                    signature.extend_from_slice(&description);
                    descriptions.insert(description, next_index);
                    next_index
                }
            };
            type_indices.insert(ty.offset, index);
        }

        if let Some(root) = type_indices.get(&self.offset) {
            signature.push(*root);
        }

        Ok(signature)
    }
}

impl<'a> std::fmt::Debug for TypeView<'a> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let mut out = String::new();
        print_type(&mut out, *self);
        f.write_str(&out)
    }
}

/// Read-only view of one struct member
#[derive(Copy, Clone)]
pub struct MemberView<'a> {
    bytes: &'a [u8],
    info: &'a MemberInfo,
}

impl<'a> MemberView<'a> {
    pub fn name(&self) -> Option<&'a str> {
        if self.info.name.is_empty() {
            None
        } else {
            Some(self.info.name.resolve_str(self.bytes))
        }
    }

    pub fn ty(&self) -> Option<TypeView<'a>> {
        TypeView::new(self.bytes, self.info.ty)
    }

    pub fn size(&self) -> u32 {
        self.info.size
    }

    pub fn offset(&self) -> u32 {
        self.info.offset
    }

    pub fn stride(&self) -> u32 {
        self.info.stride
    }
}

pub fn print_extents(
    out: &mut String,
    extents: &[ArrayExtent],
) {
    // Stored innermost first, printed in declaration order
    for extent in extents.iter().rev() {
        let _ = match extent.spec_constant_id() {
            Some(id) => write!(out, "[spec_constant({})]", id),
            None if extent.is_runtime_sized() => write!(out, "[]"),
            None => write!(out, "[{}]", extent.0),
        };
    }
}

/// Human readable dump of a type tree, one member per line. The members of a struct shared by
/// several members are only printed the first time it appears.
pub fn print_type(
    out: &mut String,
    root: TypeView,
) {
    let mut expanded = FnvHashSet::default();
    let mut stack = vec![(root, None::<MemberView>, 0usize)];
    while let Some((ty, member, depth)) = stack.pop() {
        for _ in 0..depth {
            out.push_str("    ");
        }

        let info = ty.info();
        match ty.name() {
            Some(name) => out.push_str(name),
            None if ty.is_struct() => out.push_str("struct"),
            None => {
                let _ = write!(out, "{:?}", info.var_type());
                if info.is_matrix() {
                    let _ = write!(out, "{}x{}", info.rows(), info.columns());
                } else if info.is_vector() {
                    let _ = write!(out, "{}", info.rows());
                }
            }
        }

        if let Some(member) = member {
            let _ = write!(
                out,
                " {} (offset={} size={} stride={})",
                member.name().unwrap_or("<unnamed>"),
                member.offset(),
                member.size(),
                member.stride()
            );
        }

        print_extents(out, ty.extents());
        if ty.is_struct() && !expanded.insert(ty.offset) {
            out.push_str(" (see above)\n");
            continue;
        }
        out.push('\n');

        let children: Vec<_> = ty
            .members()
            .filter_map(|m| m.ty().map(|t| (t, Some(m), depth + 1)))
            .collect();
        stack.extend(children.into_iter().rev());
    }
}
