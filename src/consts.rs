//! Well-known internal names the interpreter special-cases.
//!
//! Everything here is part of the target API surface; nothing else in the
//! crate hard-codes a class name.

/// The keyed tag container all save methods write into.
pub const COMPOUND_TAG: &str = "net/minecraft/nbt/CompoundTag";
/// The homogeneous tag list.
pub const LIST_TAG: &str = "net/minecraft/nbt/ListTag";
/// Root interface of the tag hierarchy.
pub const TAG: &str = "net/minecraft/nbt/Tag";

/// Concrete tag classes mapped to schema leaves by [`crate::schema::element::NbtElement::for_tag_class`].
pub const BYTE_TAG: &str = "net/minecraft/nbt/ByteTag";
pub const SHORT_TAG: &str = "net/minecraft/nbt/ShortTag";
pub const INT_TAG: &str = "net/minecraft/nbt/IntTag";
pub const LONG_TAG: &str = "net/minecraft/nbt/LongTag";
pub const FLOAT_TAG: &str = "net/minecraft/nbt/FloatTag";
pub const DOUBLE_TAG: &str = "net/minecraft/nbt/DoubleTag";
pub const STRING_TAG: &str = "net/minecraft/nbt/StringTag";
pub const BYTE_ARRAY_TAG: &str = "net/minecraft/nbt/ByteArrayTag";
pub const INT_ARRAY_TAG: &str = "net/minecraft/nbt/IntArrayTag";
pub const LONG_ARRAY_TAG: &str = "net/minecraft/nbt/LongArrayTag";
pub const NUMERIC_TAG: &str = "net/minecraft/nbt/NumericTag";

/// Polymorphic entity root; both pinned save methods live here.
pub const ENTITY: &str = "net/minecraft/world/entity/Entity";
/// The passenger recursion injection point; the single legitimate call site
/// of [`SAVE_WITHOUT_ID`].
pub const SAVE_AS_PASSENGER: &str = "saveAsPassenger";
/// Must only ever be entered as a driver-selected top-level entry point.
pub const SAVE_WITHOUT_ID: &str = "saveWithoutId";
/// Per-class entity save hook analyzed for every non-root entity class.
pub const ADD_ADDITIONAL_SAVE_DATA: &str = "addAdditionalSaveData";

/// Block-entity save hooks; which one applies depends on the schema version.
pub const SAVE_ADDITIONAL: &str = "saveAdditional";
pub const SAVE_LEGACY: &str = "save";

/// `java/util/Optional.ifPresent` runs its consumer under branch scope.
pub const OPTIONAL: &str = "java/util/Optional";
pub const IF_PRESENT: &str = "ifPresent";

/// The one fastutil iteration the interpreter follows into a lambda.
pub const INT2OBJECT_MAP: &str = "it/unimi/dsi/fastutil/ints/Int2ObjectMap";
pub const FOR_EACH: &str = "forEach";

/// `Either.map` produces a two-arm sum of its lambda results.
pub const EITHER: &str = "com/mojang/datafixers/util/Either";
pub const EITHER_MAP: &str = "map";

/// Recognized invokedynamic bootstrap for lambda capture.
pub const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";
pub const METAFACTORY: &str = "metafactory";
/// Method handle kind `REF_invokeStatic`; the only delegate kind followed.
pub const REF_INVOKE_STATIC: u8 = 6;

/// Historical sign block entity whose message loop defeats linear traversal.
/// Writes through its save method are synthesized as [`SIGN_TEXT_KEYS`].
pub const SIGN_BLOCK_ENTITY: &str = "net/minecraft/world/level/block/entity/SignBlockEntity";
pub const SIGN_TEXT_KEYS: &[&str] = &["Text1", "Text2", "Text3", "Text4"];

/// First schema version whose block entities save through `saveAdditional`.
pub const BLOCK_ENTITY_SPLIT_VERSION: (u32, u32) = (1, 18);
