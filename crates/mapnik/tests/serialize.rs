use builder::{build_map_from_string, shared_locator, Writer};
use config::LookupLocator;
use mapnik::Map;

fn new_map() -> Map {
    let _ = env_logger::builder().is_test(true).try_init();
    Map::new(shared_locator(LookupLocator::new(".")))
}

fn render(map: &Map) -> String {
    let mut out = Vec::new();
    map.write(&mut out).unwrap();
    String::from_utf8(out).unwrap()
}

fn compile(mml_doc: &str, style: &str) -> String {
    let mut map = new_map();
    let mml = mml::parse_str(mml_doc).unwrap();
    build_map_from_string(&mut map, &mml, style).unwrap();
    render(&map)
}

const ROADS_MML: &str = r#"
Name: test
srs: "+proj=longlat"
bounds: [-10.0, -10.0, 10.0, 10.0]
center: [0.0, 0.0, 4.0]
interactivity: true
Layer:
  - id: roads
    geometry: linestring
    datasource:
      type: postgis
      dbname: osm
      table: planet_osm_line
"#;

#[test]
fn simple_document() {
    let xml = compile(ROADS_MML, "#roads { line-width: 2; line-color: #f00; }");
    assert!(xml.starts_with("<Map srs=\"+proj=longlat\">"), "{xml}");
    assert!(xml.contains("<Parameter name=\"bounds\">-10,-10,10,10</Parameter>"));
    assert!(xml.contains("<Parameter name=\"center\">0,0,4</Parameter>"));
    assert!(xml.contains("<Parameter name=\"interactivity\">true</Parameter>"));
    assert!(xml.contains("<Style name=\"roads\" filter-mode=\"first\">"));
    assert!(xml.contains("stroke-width=\"2\""));
    assert!(xml.contains("stroke=\"rgba(255,0,0,1)\""));
    assert!(xml.contains("<Layer name=\"roads\">"));
    assert!(xml.contains("<StyleName>roads</StyleName>"));
    assert!(xml.contains("<Parameter name=\"dbname\">osm</Parameter>"));
    assert!(xml.contains("<Parameter name=\"table\">planet_osm_line</Parameter>"));
    assert!(xml.contains("<Parameter name=\"type\">postgis</Parameter>"));
    // empty connection parameters are dropped
    assert!(!xml.contains("name=\"password\""));
}

#[test]
fn background_color_from_map_block() {
    let xml = compile(
        ROADS_MML,
        "Map { background-color: #0000ff; }\n#roads { line-width: 1; }",
    );
    assert!(xml.contains("background-color=\"rgba(0,0,255,1)\""), "{xml}");
}

#[test]
fn zoom_becomes_scale_denominators() {
    let xml = compile(
        ROADS_MML,
        "#roads[zoom>=5][zoom<=10] { line-width: 1; }",
    );
    assert!(xml.contains("<MaxScaleDenominator>25000000</MaxScaleDenominator>"), "{xml}");
    assert!(xml.contains("<MinScaleDenominator>400000</MinScaleDenominator>"));

    // a lower-bound-only range still gets both bounds: its highest
    // level is the last table entry
    let xml = compile(ROADS_MML, "#roads[zoom>=5] { line-width: 1; }");
    assert!(xml.contains("<MaxScaleDenominator>25000000</MaxScaleDenominator>"), "{xml}");
    assert!(xml.contains("<MinScaleDenominator>100</MinScaleDenominator>"));

    // an upper-bound-only range gets no upper scale bound
    let xml = compile(ROADS_MML, "#roads[zoom<=10] { line-width: 1; }");
    assert!(!xml.contains("MaxScaleDenominator"), "{xml}");
    assert!(xml.contains("<MinScaleDenominator>400000</MinScaleDenominator>"));
}

#[test]
fn filters_render_as_cdata() {
    let xml = compile(
        ROADS_MML,
        "#roads[highway='motorway'][lanes>=2] { line-width: 1; }\n\
         #roads[name=~'A.*'] { line-width: 2; }",
    );
    assert!(
        xml.contains("<Filter><![CDATA[([highway] = 'motorway') and ([lanes] >= 2)]]></Filter>"),
        "{xml}"
    );
    assert!(xml.contains("<Filter><![CDATA[([name].match('A.*'))]]></Filter>"));
}

#[test]
fn instances_emit_separate_symbolizers_in_declaration_order() {
    let xml = compile(
        ROADS_MML,
        "#roads { a/line-width: 1; b/line-width: 2; }",
    );
    let first = xml.find("stroke-width=\"1\"").expect("first instance");
    let second = xml.find("stroke-width=\"2\"").expect("second instance");
    assert!(first < second, "{xml}");
    assert_eq!(xml.matches("<LineSymbolizer").count(), 2);
}

#[test]
fn font_sets_are_interned() {
    let style = "#roads { text-name: [name]; text-size: 12; \
                 text-face-name: 'Noto Sans Regular', 'Noto Sans Bold'; }\n\
                 #roads[zoom>=10] { text-name: [ref]; text-size: 10; \
                 text-face-name: 'Noto Sans Regular', 'Noto Sans Bold'; }";
    let xml = compile(ROADS_MML, style);
    assert_eq!(xml.matches("<FontSet name=\"fontset-1\">").count(), 1);
    assert!(xml.contains("<Font face-name=\"Noto Sans Regular\"/>"));
    assert!(xml.contains("<Font face-name=\"Noto Sans Bold\"/>"));
    assert_eq!(xml.matches("fontset-name=\"fontset-1\"").count(), 2);
    assert!(xml.contains(">[name]</TextSymbolizer>"));
}

#[test]
fn polygon_and_marker_symbolizers() {
    let style = "#roads { polygon-fill: #00ff00; polygon-opacity: 0.5; }\n\
                 #roads::dots { marker-fill: #123456; marker-width: 4; }";
    let xml = compile(ROADS_MML, style);
    assert!(xml.contains("<PolygonSymbolizer fill=\"rgba(0,255,0,1)\" fill-opacity=\"0.5\"/>"), "{xml}");
    assert!(xml.contains("<MarkersSymbolizer"));
    assert!(xml.contains("marker-type=\"ellipse\""));
}

#[test]
fn raster_colorizer_stops() {
    let style = "#roads { raster-opacity: 0.8; \
                 raster-colorizer-default-mode: linear; \
                 raster-colorizer-stops: stop(0, #000000) stop(100, #ffffff); }";
    let xml = compile(ROADS_MML, style);
    assert!(xml.contains("<RasterSymbolizer opacity=\"0.8\">"), "{xml}");
    assert!(xml.contains("<RasterColorizer default-mode=\"linear\">"));
    assert!(xml.contains("<stop value=\"0\" color=\"rgba(0,0,0,1)\"/>"));
    assert!(xml.contains("<stop value=\"100\" color=\"rgba(255,255,255,1)\"/>"));
}

#[test]
fn inactive_layers_are_skipped() {
    let doc = r#"
Layer:
  - id: roads
    geometry: linestring
  - id: drafts
    status: "off"
"#;
    let xml = compile(doc, "#roads, #drafts { line-width: 1; }");
    assert!(xml.contains("<Layer name=\"roads\">"));
    assert!(!xml.contains("drafts"));
}

#[test]
fn layer_zoom_bounds_override() {
    let doc = r#"
Layer:
  - id: roads
    geometry: linestring
    properties:
      minzoom: 5
      maxzoom: 17
"#;
    let xml = compile(doc, "#roads { line-width: 1; }");
    assert!(xml.contains("maximum-scale-denominator=\"25000000\""), "{xml}");
    assert!(xml.contains("minimum-scale-denominator=\"2500\""));
}

#[test]
fn auto_type_filter_wraps_query() {
    let mut map = new_map();
    map.set_auto_type_filter(true);
    let mml = mml::parse_str(ROADS_MML).unwrap();
    build_map_from_string(
        &mut map,
        &mml,
        "#roads[highway='motorway'] { line-width: 2; }\n\
         #roads[highway='trunk'] { line-width: 1; }",
    )
    .unwrap();
    let xml = render(&map);
    assert!(
        xml.contains(
            "(SELECT * FROM planet_osm_line WHERE (\"highway\" IN ('motorway', 'trunk'))) as filtered"
        ),
        "{xml}"
    );
}

#[test]
fn emit_is_idempotent() {
    let mut map = new_map();
    let mml = mml::parse_str(ROADS_MML).unwrap();
    build_map_from_string(
        &mut map,
        &mml,
        "#roads { line-width: 2; [zoom>=8] { line-width: 4; } }",
    )
    .unwrap();
    let first = render(&map);
    let second = render(&map);
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn mapnik2_layer_zoom_attributes() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut map = builder::MapMaker::new_map(&mapnik::MAKER2, shared_locator(LookupLocator::new(".")));
    let doc = r#"
Layer:
  - id: roads
    geometry: linestring
    properties:
      minzoom: 5
      maxzoom: 17
"#;
    let mml = mml::parse_str(doc).unwrap();
    build_map_from_string(&mut map, &mml, "#roads { line-width: 1; }").unwrap();
    let mut out = Vec::new();
    map.write(&mut out).unwrap();
    let xml = String::from_utf8(out).unwrap();
    assert!(xml.contains("maxzoom=\"17\""), "{xml}");
    assert!(xml.contains("minzoom=\"5\""));
    assert!(!xml.contains("scale-denominator"));
}

#[test]
fn caller_supplied_scale_table() {
    let mut map = new_map();
    map.set_zoom_scales(vec![1000, 500, 100]);
    let mml = mml::parse_str(ROADS_MML).unwrap();
    build_map_from_string(
        &mut map,
        &mml,
        "#roads[zoom>=1] { line-width: 1; }\n#roads[zoom>=5] { line-width: 2; }",
    )
    .unwrap();
    let xml = render(&map);
    assert!(xml.contains("<MaxScaleDenominator>1000</MaxScaleDenominator>"), "{xml}");
    // levels past the end of a short table clamp to its last entry
    assert!(xml.contains("<MaxScaleDenominator>100</MaxScaleDenominator>"));
}
