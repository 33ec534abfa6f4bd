//! Tool-specific custom event names.
//!
//! Use with [`StandardEvent::custom`](crate::StandardEvent::custom) when a standard
//! category is too coarse.

pub mod rhino {
    pub const NURBS_SURFACE_CREATED: &str = "rhino.nurbs_surface_created";
    pub const NURBS_CURVE_CREATED: &str = "rhino.nurbs_curve_created";
    pub const MESH_CREATED: &str = "rhino.mesh_created";
    pub const POLYSURFACE_CREATED: &str = "rhino.polysurface_created";

    pub const BOOLEAN_OPERATION: &str = "rhino.boolean_operation";
    pub const FILLET_CREATED: &str = "rhino.fillet_created";
    pub const EXTRUDE_OPERATION: &str = "rhino.extrude_operation";
    pub const LOFT_OPERATION: &str = "rhino.loft_operation";

    pub const GRASSHOPPER_DEFINITION_LOADED: &str = "rhino.grasshopper_definition_loaded";
    pub const GRASSHOPPER_BAKED: &str = "rhino.grasshopper_baked";

    pub const LAYER_LOCKED: &str = "rhino.layer_locked";
    pub const LAYER_UNLOCKED: &str = "rhino.layer_unlocked";

    pub const BLOCK_DEFINITION_CREATED: &str = "rhino.block_definition_created";
    pub const BLOCK_INSTANCE_INSERTED: &str = "rhino.block_instance_inserted";
}

pub mod blender {
    pub const MODIFIER_ADDED: &str = "blender.modifier_added";
    pub const MODIFIER_APPLIED: &str = "blender.modifier_applied";
    pub const ANIMATION_KEYFRAME_SET: &str = "blender.animation_keyframe_set";
    pub const SHADER_NODE_CREATED: &str = "blender.shader_node_created";
}
