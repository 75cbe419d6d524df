
/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// Well known oids of built-in types.
///
/// Values come from `pg_type.dat` and are stable across server versions.
pub mod oid {
    use super::Oid;

    macro_rules! oids {
        ($($name:ident = $oid:literal $(, $doc:literal)?;)*) => {
            $(
                $(#[doc = $doc])?
                pub const $name: Oid = $oid;
            )*
        };
    }

    oids! {
        UNSPECIFIED = 0, "Placing a zero as parameter type leaves the type unspecified";
        BOOL = 16, "`bool` boolean, 'true'/'false'";
        BYTEA = 17, "`bytea` variable-length string, binary values escaped";
        CHAR = 18, "`\"char\"` single character";
        NAME = 19, "`name` 63-byte type for storing system identifiers";
        INT8 = 20, "`int8` ~18 digit integer, 8-byte storage";
        INT2 = 21, "`int2` -32 thousand to 32 thousand, 2-byte storage";
        INT4 = 23, "`int4` -2 billion to 2 billion integer, 4-byte storage";
        TEXT = 25, "`text` variable-length string, no limit specified";
        OID = 26, "`oid` object identifier, 4-byte storage";
        JSON = 114, "`json` JSON stored as text";
        JSON_ARRAY = 199;
        FLOAT4 = 700, "`float4` single-precision floating point number, 4-byte storage";
        FLOAT8 = 701, "`float8` double-precision floating point number, 8-byte storage";
        UNKNOWN = 705, "`unknown` pseudo-type representing an undetermined type";
        BOOL_ARRAY = 1000;
        BYTEA_ARRAY = 1001;
        CHAR_ARRAY = 1002;
        NAME_ARRAY = 1003;
        INT2_ARRAY = 1005;
        INT4_ARRAY = 1007;
        TEXT_ARRAY = 1009;
        BPCHAR_ARRAY = 1014;
        VARCHAR_ARRAY = 1015;
        INT8_ARRAY = 1016;
        FLOAT4_ARRAY = 1021;
        FLOAT8_ARRAY = 1022;
        OID_ARRAY = 1028;
        BPCHAR = 1042, "`bpchar` blank-padded string, fixed storage length";
        VARCHAR = 1043, "`varchar` variable-length string, limit specified";
        DATE = 1082, "`date` date";
        TIME = 1083, "`time` time of day";
        TIMESTAMP = 1114, "`timestamp` date and time";
        TIMESTAMP_ARRAY = 1115;
        DATE_ARRAY = 1182;
        TIME_ARRAY = 1183;
        TIMESTAMPTZ = 1184, "`timestamptz` date and time with time zone";
        TIMESTAMPTZ_ARRAY = 1185;
        INTERVAL = 1186, "`interval` time interval";
        INTERVAL_ARRAY = 1187;
        NUMERIC_ARRAY = 1231;
        TIMETZ = 1266, "`timetz` time of day with time zone";
        TIMETZ_ARRAY = 1270;
        NUMERIC = 1700, "`numeric` arbitrary precision number";
        RECORD = 2249, "`record` pseudo-type representing any composite type";
        VOID = 2278, "`void` pseudo-type for functions returning no value";
        UUID = 2950, "`uuid` UUID datatype";
        UUID_ARRAY = 2951;
        JSONB = 3802, "`jsonb` Binary JSON";
        JSONB_ARRAY = 3807;
        INT4RANGE = 3904, "`int4range` range of integers";
        NUMRANGE = 3906, "`numrange` range of numerics";
        TSRANGE = 3908, "`tsrange` range of timestamps without time zone";
        TSTZRANGE = 3910, "`tstzrange` range of timestamps with time zone";
        DATERANGE = 3912, "`daterange` range of dates";
        INT8RANGE = 3926, "`int8range` range of bigints";
        INT4MULTIRANGE = 4451, "`int4multirange` multirange of integers";
        NUMMULTIRANGE = 4532, "`nummultirange` multirange of numerics";
        TSMULTIRANGE = 4533, "`tsmultirange` multirange of timestamps without time zone";
        TSTZMULTIRANGE = 4534, "`tstzmultirange` multirange of timestamps with time zone";
        DATEMULTIRANGE = 4535, "`datemultirange` multirange of dates";
        INT8MULTIRANGE = 4536, "`int8multirange` multirange of bigints";
    }
}
