//! Native struct memory layout.
//!
//! Follows C layout rules: each field at its natural alignment, nested
//! structs stored inline, total size padded to the largest field alignment.

use std::collections::BTreeMap;

use spibind_core::{DeclarationModel, StructDecl, TypeRef};

use crate::error::{MarshalError, Result};

/// Placement of one field inside a struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: String,
    pub ty: TypeRef,
    pub offset: usize,
    pub size: usize,
}

/// Computed layout of one struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructLayout {
    pub name: String,
    pub size: usize,
    pub align: usize,
    /// Fields in declaration (= memory) order.
    pub fields: Vec<FieldLayout>,
}

impl StructLayout {
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Layouts of every struct in a declaration model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutTable {
    layouts: BTreeMap<String, StructLayout>,
}

impl LayoutTable {
    /// Compute the layout of every struct in the model.
    ///
    /// The model guarantees struct containment is acyclic, so recursion
    /// into nested structs terminates.
    pub fn build(model: &DeclarationModel) -> Result<Self> {
        let mut table = LayoutTable::default();
        for decl in model.structs() {
            table.compute(model, decl)?;
        }
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<&StructLayout> {
        self.layouts.get(name)
    }

    /// Like [`get`](Self::get) but fails with [`MarshalError::UnknownStruct`].
    pub fn require(&self, name: &str) -> Result<&StructLayout> {
        self.layouts.get(name).ok_or_else(|| MarshalError::UnknownStruct {
            name: name.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    fn compute(&mut self, model: &DeclarationModel, decl: &StructDecl) -> Result<(usize, usize)> {
        if let Some(done) = self.layouts.get(&decl.name) {
            return Ok((done.size, done.align));
        }

        let mut offset = 0usize;
        let mut max_align = 1usize;
        let mut fields = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            let (size, align) = match &field.ty {
                TypeRef::Primitive { primitive } => (primitive.size(), primitive.align()),
                TypeRef::FixedText { max_len } => (*max_len, 1),
                TypeRef::StructRef { name } => {
                    let nested = model
                        .find_struct(name)
                        .ok_or_else(|| MarshalError::UnknownStruct { name: name.clone() })?;
                    self.compute(model, nested)?
                }
                other => {
                    return Err(MarshalError::Unsupported {
                        ty: format!("field {}::{} of type {other}", decl.name, field.name),
                    })
                }
            };
            offset = align_up(offset, align);
            fields.push(FieldLayout {
                name: field.name.clone(),
                ty: field.ty.clone(),
                offset,
                size,
            });
            offset += size;
            max_align = max_align.max(align);
        }

        let size = align_up(offset, max_align);
        self.layouts.insert(
            decl.name.clone(),
            StructLayout {
                name: decl.name.clone(),
                size,
                align: max_align,
                fields,
            },
        );
        Ok((size, max_align))
    }
}

/// Round `value` up to the next multiple of `align` (a power of two).
pub fn align_up(value: usize, align: usize) -> usize {
    if align <= 1 {
        return value;
    }
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> DeclarationModel {
        DeclarationModel::parse(
            r#"
[library]
name = "ctp"

[typedefs]
TThostFtdcBrokerIDType = "char[11]"
TThostFtdcVolumeType = "int"
TThostFtdcPriceType = "double"
TThostFtdcDirectionType = "char"

[[structs]]
name = "CThostFtdcOrderField"
fields = [
    "TThostFtdcBrokerIDType BrokerID",
    "TThostFtdcDirectionType Direction",
    "TThostFtdcVolumeType Volume",
    "TThostFtdcPriceType LimitPrice",
]

[[structs]]
name = "Envelope"
fields = ["char Tag", "CThostFtdcOrderField Order"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn c_layout_with_padding() {
        let table = LayoutTable::build(&model()).unwrap();
        let order = table.require("CThostFtdcOrderField").unwrap();
        let offsets: Vec<_> = order.fields.iter().map(|f| f.offset).collect();
        // BrokerID[11] @0, Direction @11, Volume aligned to 12, LimitPrice aligned to 16
        assert_eq!(offsets, [0, 11, 12, 16]);
        assert_eq!(order.size, 24);
        assert_eq!(order.align, 8);
    }

    #[test]
    fn nested_struct_inline() {
        let table = LayoutTable::build(&model()).unwrap();
        let env = table.require("Envelope").unwrap();
        assert_eq!(env.field("Order").unwrap().offset, 8);
        assert_eq!(env.size, 32);
    }

    #[test]
    fn unknown_struct() {
        let table = LayoutTable::build(&model()).unwrap();
        assert!(matches!(table.require("Nope"), Err(MarshalError::UnknownStruct { .. })));
    }

    #[test]
    fn align_up_values() {
        assert_eq!(align_up(11, 4), 12);
        assert_eq!(align_up(16, 8), 16);
        assert_eq!(align_up(3, 1), 3);
    }
}
